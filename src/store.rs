use anyhow::{Context, anyhow};

const OBJECT_PREFIX: &str = "pcp_forms";

/// Thin client for a GCS-style object store. Uploads go through the JSON
/// media-upload endpoint; stored objects are publicly readable under
/// `{endpoint}/{bucket}/{object_name}`.
pub struct ObjectStore {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl ObjectStore {
    pub fn new(endpoint: &str, bucket: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token: std::env::var("STORAGE_TOKEN").ok(),
        }
    }

    pub async fn upload_pdf(&self, object_name: &str, bytes: Vec<u8>) -> anyhow::Result<String> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint,
            self.bucket,
            urlencoding::encode(object_name)
        );

        tracing::info!("Uploading {} bytes -> {}", bytes.len(), object_name);

        let mut req = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        if !resp.status().is_success() {
            return Err(anyhow!(
                "Upload failed ({}): {}",
                resp.status(),
                object_name
            ));
        }

        Ok(self.public_url(object_name))
    }

    pub fn public_url(&self, object_name: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, object_name)
    }
}

/// Builds the bucket object name for a filled form. Plan labels can contain
/// spaces and slashes ("Elder Plan", "Anthem/Empire"); anything that is not
/// filename-safe becomes an underscore so the name stays a flat key.
pub fn object_name_for(insurance: &str, millis: i64) -> String {
    let label = sanitize_label(insurance);
    format!("{OBJECT_PREFIX}/{label}_PCP_Form_{millis}.pdf")
}

fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out
}
