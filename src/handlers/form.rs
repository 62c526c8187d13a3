//! Multipart form decoding into [`IncomingValues`].
//!
//! Fields are named `Form[attribute]`. Plain values are kept for the
//! requested form only; file parts are spooled to disk for every form.

use crate::{
    errors::AppError,
    models::upload::{IncomingValues, PendingUpload},
};
use axum::extract::Multipart;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

/// Split `Post[image]` into `("Post", "image")`.
pub fn parse_field_name(name: &str) -> Option<(&str, &str)> {
    let (form, rest) = name.split_once('[')?;
    let attribute = rest.strip_suffix(']')?;
    if form.is_empty() || attribute.is_empty() || attribute.contains(['[', ']']) {
        return None;
    }
    Some((form, attribute))
}

/// Read every part of `multipart`. On error, files spooled so far are removed.
pub async fn read_form(
    mut multipart: Multipart,
    form_name: &str,
    tmp_dir: &Path,
    max_upload_bytes: u64,
) -> Result<IncomingValues, AppError> {
    fs::create_dir_all(tmp_dir).await?;
    let mut incoming = IncomingValues::default();

    let result = async {
        while let Some(mut field) = multipart.next_field().await? {
            let Some((form, attribute)) = field.name().and_then(parse_field_name) else {
                debug!(field = ?field.name(), "ignoring field outside any form");
                continue;
            };
            let (form, attribute) = (form.to_string(), attribute.to_string());

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let temp_path = tmp_dir.join(format!("upload-{}", Uuid::new_v4()));
                    let upload = if file_name.is_empty() {
                        PendingUpload::new(temp_path, "", 0)
                    } else {
                        spool(&mut field, temp_path, file_name, max_upload_bytes).await?
                    };
                    let uploads = incoming.files.entry(form).or_default();
                    if let Some(replaced) = uploads.insert(attribute, upload) {
                        debug!(file = %replaced.name, "repeated file field, keeping the last part");
                        replaced.discard_temp().await;
                    }
                }
                None if form == form_name => {
                    let value = field.text().await?;
                    incoming.values.insert(attribute, value);
                }
                None => debug!(form = %form, attribute = %attribute, "ignoring value for another form"),
            }
        }
        Ok::<_, AppError>(())
    }
    .await;

    match result {
        Ok(()) => Ok(incoming),
        Err(err) => {
            incoming.cleanup().await;
            Err(err)
        }
    }
}

/// Stream one file part to `temp_path`. Oversized parts come back as failed
/// uploads with their partial file removed.
async fn spool(
    field: &mut axum::extract::multipart::Field<'_>,
    temp_path: PathBuf,
    file_name: String,
    max_upload_bytes: u64,
) -> Result<PendingUpload, AppError> {
    let mut file = fs::File::create(&temp_path).await?;
    let mut size: u64 = 0;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                drop(file);
                let _ = fs::remove_file(&temp_path).await;
                return Err(err.into());
            }
        };
        size += chunk.len() as u64;
        if size > max_upload_bytes {
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            warn!(file = %file_name, limit = max_upload_bytes, "upload exceeds size limit");
            return Ok(PendingUpload::failed(temp_path, file_name));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    debug!(file = %file_name, size, path = %temp_path.display(), "spooled upload");
    Ok(PendingUpload::new(temp_path, file_name, size))
}
