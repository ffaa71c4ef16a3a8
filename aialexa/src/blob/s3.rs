use super::{BlobError, BlobObject, BlobPutRequest, BlobStore, object_key, public_url, validate_key};
use crate::config::BlobStorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    Client,
    config::Region,
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::ObjectCannedAcl,
};
use tracing::{debug, instrument};
use url::Url;

/// S3-compatible blob store writing `public-read` objects
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_base_url: Url,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: String, public_base_url: Url) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }

    /// Build a client from the `s3` blob storage settings and the ambient AWS configuration
    pub async fn from_config(config: &BlobStorageConfig) -> anyhow::Result<Self> {
        let BlobStorageConfig::S3 {
            bucket,
            region,
            endpoint_url,
            public_base_url,
            access_key_id,
            secret_access_key,
        } = config
        else {
            anyhow::bail!("S3 blob store requires blob_storage.type = s3");
        };

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        // Custom endpoints (MinIO, R2, ...) rarely support virtual-hosted buckets
        if endpoint_url.is_some() {
            builder = builder.force_path_style(true);
        }
        if let (Some(id), Some(secret)) = (access_key_id, secret_access_key) {
            builder = builder.credentials_provider(Credentials::new(id, secret, None, None, "aialexa-config"));
        }
        let client = Client::from_conf(builder.build());

        let public_base_url = match (public_base_url, endpoint_url) {
            (Some(url), _) => url.clone(),
            (None, Some(endpoint)) => {
                let mut url = Url::parse(endpoint)?;
                url.path_segments_mut()
                    .map_err(|_| anyhow::anyhow!("invalid endpoint_url {endpoint}"))?
                    .pop_if_empty()
                    .push(bucket);
                url
            }
            (None, None) => {
                let region = sdk_config.region().map(|r| r.as_ref().to_string()).unwrap_or_else(|| "us-east-1".to_string());
                Url::parse(&format!("https://{bucket}.s3.{region}.amazonaws.com"))?
            }
        };

        Ok(Self::new(client, bucket.clone(), public_base_url))
    }
}

fn backend_error<E: std::error::Error>(operation: &str, err: E) -> BlobError {
    BlobError::Backend(format!("{operation}: {}", DisplayErrorContext(err)))
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self, request), fields(bucket = %self.bucket, name = %request.name, size = request.content.len()), err)]
    async fn put(&self, request: BlobPutRequest) -> Result<BlobObject, BlobError> {
        let key = object_key(&request.name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(request.content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .body(ByteStream::from(request.content))
            .send()
            .await
            .map_err(|e| backend_error("put_object", e))?;

        let url = public_url(&self.public_base_url, &[], &key)?;
        debug!(%key, "Stored blob in S3");
        Ok(BlobObject { key, url })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket), err)]
    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        validate_key(key)?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend_error("delete_object", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn s3_config(endpoint: &str, public_base_url: Option<&str>) -> BlobStorageConfig {
        BlobStorageConfig::S3 {
            bucket: "uploads".to_string(),
            region: Some("eu-west-1".to_string()),
            endpoint_url: Some(endpoint.to_string()),
            public_base_url: public_base_url.map(|u| Url::parse(u).unwrap()),
            access_key_id: Some("test-access".to_string()),
            secret_access_key: Some("test-secret".to_string()),
        }
    }

    #[tokio::test]
    async fn test_put_uses_public_read_acl() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/uploads/[0-9a-f]{32}/notes\.pdf$"))
            .and(header("x-amz-acl", "public-read"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = S3BlobStore::from_config(&s3_config(&server.uri(), Some("https://cdn.example.com")))
            .await
            .unwrap();
        let object = store
            .put(BlobPutRequest {
                name: "notes.pdf".to_string(),
                content: Bytes::from_static(b"%PDF-1.7"),
                content_type: "application/pdf".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(object.url, format!("https://cdn.example.com/{}", object.key));
    }

    #[tokio::test]
    async fn test_public_url_defaults_to_path_style_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/uploads/abc/notes\.pdf$"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = S3BlobStore::from_config(&s3_config(&server.uri(), None)).await.unwrap();
        assert_eq!(store.public_base_url.as_str(), format!("{}/uploads", server.uri()));

        store.delete("abc/notes.pdf").await.unwrap();
    }

    #[tokio::test]
    async fn test_backend_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = S3BlobStore::from_config(&s3_config(&server.uri(), None)).await.unwrap();
        let result = store
            .put(BlobPutRequest {
                name: "a.txt".to_string(),
                content: Bytes::from_static(b"a"),
                content_type: "text/plain".to_string(),
            })
            .await;

        assert!(matches!(result, Err(BlobError::Backend(_))));
    }
}
