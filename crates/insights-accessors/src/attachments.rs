//! Image and PDF uploads for the article editor.

use chrono::Utc;
use insights_gateway::{GatewayError, GatewayResult, ObjectStorage};
use insights_model::{ImageRef, PdfRef};
use tracing::info;
use uuid::Uuid;

pub const IMAGES_BUCKET: &str = "images";
pub const PDFS_BUCKET: &str = "pdfs";

/// Object name `<millis>-<random>.<ext>`, keeping the file's extension.
pub fn object_name(file_name: &str, millis: i64, random: &str) -> String {
    match extension(file_name) {
        Some(ext) => format!("{millis}-{random}.{ext}"),
        None => format!("{millis}-{random}"),
    }
}

fn extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn fresh_name(file_name: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    object_name(file_name, Utc::now().timestamp_millis(), &random[..6])
}

fn image_content_type(ext: &str) -> Option<&'static str> {
    match ext {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

/// Upload an image; the reference's alt text is the original file name.
pub async fn upload_image(
    storage: &dyn ObjectStorage,
    file_name: &str,
    bytes: Vec<u8>,
) -> GatewayResult<ImageRef> {
    let content_type = extension(file_name)
        .as_deref()
        .and_then(image_content_type)
        .ok_or_else(|| GatewayError::Validation(format!("{file_name} is not an image")))?;
    if bytes.is_empty() {
        return Err(GatewayError::Validation(format!("{file_name} is empty")));
    }

    let path = storage
        .upload(IMAGES_BUCKET, &fresh_name(file_name), bytes, content_type)
        .await?;
    info!(bucket = IMAGES_BUCKET, path = %path, "Image uploaded");
    Ok(ImageRef {
        url: storage.public_url(IMAGES_BUCKET, &path),
        alt: Some(file_name.to_string()),
    })
}

/// Upload a PDF; the reference's display name is the original file name.
pub async fn upload_pdf(
    storage: &dyn ObjectStorage,
    file_name: &str,
    bytes: Vec<u8>,
) -> GatewayResult<PdfRef> {
    if extension(file_name).as_deref() != Some("pdf") {
        return Err(GatewayError::Validation(format!("{file_name} is not a PDF")));
    }
    if bytes.is_empty() {
        return Err(GatewayError::Validation(format!("{file_name} is empty")));
    }

    let path = storage
        .upload(PDFS_BUCKET, &fresh_name(file_name), bytes, "application/pdf")
        .await?;
    info!(bucket = PDFS_BUCKET, path = %path, "PDF uploaded");
    Ok(PdfRef {
        url: storage.public_url(PDFS_BUCKET, &path),
        name: file_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_gateway::{ErrorKind, MemoryStorage};

    #[test]
    fn object_names_keep_extension() {
        assert_eq!(object_name("Court Photo.JPG", 1700000000000, "k3x9a1"), "1700000000000-k3x9a1.jpg");
        assert_eq!(object_name("brief.final.pdf", 1, "r"), "1-r.pdf");
        assert_eq!(object_name("README", 1, "r"), "1-r");
        assert_eq!(object_name(".hidden", 1, "r"), "1-r");
    }

    #[tokio::test]
    async fn image_upload_returns_public_reference() {
        let storage = MemoryStorage::new();
        let image = upload_image(&storage, "gavel.png", vec![0x89, 0x50]).await.unwrap();
        assert!(image.url.starts_with("memory://storage/images/"));
        assert!(image.url.ends_with(".png"));
        assert_eq!(image.alt.as_deref(), Some("gavel.png"));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn pdf_upload_validates_before_storing() {
        let storage = MemoryStorage::new();
        let err = upload_pdf(&storage, "notes.docx", vec![1]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = upload_pdf(&storage, "empty.pdf", Vec::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(storage.is_empty());

        let pdf = upload_pdf(&storage, "Judgment.pdf", b"%PDF-1.7".to_vec()).await.unwrap();
        assert_eq!(pdf.name, "Judgment.pdf");
        assert!(pdf.url.starts_with("memory://storage/pdfs/"));
    }
}
