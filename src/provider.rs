use serde::{Deserialize, Serialize};

/// Supported object storage provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// Google Cloud Storage through its S3-interoperable XML API (HMAC keys)
    #[default]
    GoogleCloudStorage,
    /// Amazon Web Services S3
    AwsS3,
    /// Cloudflare R2 - S3-compatible object storage
    CloudflareR2,
}

impl ProviderType {
    /// Returns whether this provider requires path-style URLs
    /// R2 and GCS interop require path-style, AWS S3 uses virtual-hosted style by default
    pub fn force_path_style(&self) -> bool {
        match self {
            ProviderType::GoogleCloudStorage | ProviderType::CloudflareR2 => true,
            ProviderType::AwsS3 => false,
        }
    }

    /// Returns the default region for this provider
    pub fn default_region(&self) -> &'static str {
        match self {
            ProviderType::GoogleCloudStorage | ProviderType::CloudflareR2 => "auto",
            ProviderType::AwsS3 => "us-east-1",
        }
    }

    /// Endpoint used when the credentials file does not name one.
    /// AWS S3 resolves its endpoint from the region; R2 endpoints are per-account.
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            ProviderType::GoogleCloudStorage => Some("https://storage.googleapis.com"),
            ProviderType::AwsS3 | ProviderType::CloudflareR2 => None,
        }
    }

    /// Returns display name for the provider
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderType::GoogleCloudStorage => "Google Cloud Storage",
            ProviderType::AwsS3 => "Amazon S3",
            ProviderType::CloudflareR2 => "Cloudflare R2",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_serde_snake_case() {
        let p: ProviderType = serde_json::from_str("\"google_cloud_storage\"").unwrap();
        assert_eq!(p, ProviderType::GoogleCloudStorage);
        assert_eq!(
            serde_json::to_string(&ProviderType::CloudflareR2).unwrap(),
            "\"cloudflare_r2\""
        );
    }

    #[test]
    fn test_gcs_defaults() {
        let p = ProviderType::GoogleCloudStorage;
        assert!(p.force_path_style());
        assert_eq!(p.default_endpoint(), Some("https://storage.googleapis.com"));
        assert_eq!(ProviderType::AwsS3.default_endpoint(), None);
    }
}
