//! Filename extension checks against the provider's tool allow-lists.

use crate::config::UploadsConfig;
use std::collections::HashSet;

/// Text after the last `.`; a name without a dot is its own extension
pub fn extension_of(filename: &str) -> &str {
    filename.rsplit_once('.').map_or(filename, |(_, ext)| ext)
}

/// Union of the code interpreter and file search allow-lists. Matching is case-sensitive.
#[derive(Debug, Clone)]
pub struct AllowedExtensions {
    extensions: HashSet<String>,
}

impl AllowedExtensions {
    pub fn from_config(config: &UploadsConfig) -> Self {
        let extensions = config
            .code_interpreter_extensions
            .iter()
            .chain(config.file_search_extensions.iter())
            .cloned()
            .collect();
        Self { extensions }
    }

    pub fn allows(&self, filename: &str) -> bool {
        self.extensions.contains(extension_of(filename))
    }
}
