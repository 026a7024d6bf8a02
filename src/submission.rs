use crate::{
    captcha::{self, CaptchaError},
    errors::{RepoError, StorageError},
    models::Meme,
    outcome::{compensate, Outcome},
    request::{decode_image_data, validate_image_data, ImageError},
    AppState,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMemeRequest {
    #[serde(default)]
    pub image_data: Option<Value>,
    #[serde(default)]
    pub captcha_answer: Option<Value>,
    #[serde(default)]
    pub captcha_question: Option<String>,
}

impl SubmitMemeRequest {
    /// Image payload, if it is a string at all.
    pub fn image_data(&self) -> Option<&str> {
        self.image_data.as_ref().and_then(Value::as_str)
    }

    /// Whether the image field is absent, null or an empty string.
    pub fn image_missing(&self) -> bool {
        match &self.image_data {
            None | Some(Value::Null) | Some(Value::Bool(false)) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }

    /// Question and answer, both present and non-empty.
    pub fn captcha(&self) -> Result<(&str, String), SubmitError> {
        let question = self
            .captcha_question
            .as_deref()
            .filter(|q| !q.is_empty())
            .ok_or(SubmitError::MissingCaptcha)?;
        let answer = captcha::answer_text(self.captcha_answer.as_ref()).ok_or(SubmitError::MissingCaptcha)?;
        Ok((question, answer))
    }

    /// Checks captcha presence and value.
    pub fn verify_captcha(&self) -> Result<(), SubmitError> {
        let (question, answer) = self.captcha()?;
        captcha::verify(question, &answer)?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("captcha is missing")]
    MissingCaptcha,
    #[error(transparent)]
    Captcha(#[from] CaptchaError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("failed to upload image")]
    Upload(#[source] StorageError),
    /// Insert failed, uploaded image was removed.
    #[error("failed to save meme")]
    SaveFailed(#[source] RepoError),
    /// Insert failed and the uploaded image is still stored.
    #[error("failed to save meme ({save}); image cleanup failed ({cleanup})")]
    Unreconciled { save: RepoError, cleanup: StorageError },
}

/// Validates, uploads the image and stores a new meme with zero votes.
pub async fn submit_meme(state: &AppState, request: &SubmitMemeRequest) -> Result<Meme, SubmitError> {
    request.verify_captcha()?;

    let raw = request.image_data();
    validate_image_data(raw)?;
    let image = decode_image_data(raw.unwrap_or_default())?;

    let now = state.clock.now();
    let file_name = format!("meme_{}.{}", now.timestamp_millis(), image.extension);
    let content_type = image.content_type();

    tracing::debug!(%file_name, %content_type, size = image.bytes.len(), "Uploading meme image");
    state
        .file_storage
        .upload(&file_name, image.bytes, Some(content_type))
        .await
        .map_err(SubmitError::Upload)?;

    let meme = Meme::new(state.file_storage.public_url(&file_name), now);
    let created = state.meme_repo.create(&meme).await.map(|()| meme);

    match compensate(created, || state.file_storage.delete(&file_name)).await {
        Outcome::Committed(meme) => {
            tracing::info!(meme_id = %meme.id, %file_name, "Meme created successfully");
            Ok(meme)
        }
        Outcome::Compensated(save) => {
            tracing::warn!(%file_name, error = %save, "Meme insert failed, uploaded image removed");
            Err(SubmitError::SaveFailed(save))
        }
        Outcome::NeedsReconciliation { failure, compensation } => {
            tracing::error!(%file_name, error = %failure, cleanup_error = %compensation, "Meme insert failed and uploaded image could not be removed");
            Err(SubmitError::Unreconciled {
                save: failure,
                cleanup: compensation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::EnvironmentFlags,
        memory::{InMemoryFileStorage, InMemoryMemeRepository, InMemoryVoteRepository, ManualClock},
    };
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn fixture() -> (AppState, Arc<InMemoryMemeRepository>, Arc<InMemoryFileStorage>) {
        let memes = Arc::new(InMemoryMemeRepository::new());
        let storage = Arc::new(InMemoryFileStorage::new("http://storage/memes/"));
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
        let state = AppState {
            meme_repo: memes.clone(),
            vote_repo: Arc::new(InMemoryVoteRepository::new()),
            file_storage: storage.clone(),
            clock,
            environment: EnvironmentFlags::default(),
        };
        (state, memes, storage)
    }

    fn request(image: Value, answer: Value) -> SubmitMemeRequest {
        serde_json::from_value(json!({
            "imageData": image,
            "captchaAnswer": answer,
            "captchaQuestion": "2 + 3",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn stores_image_and_meme() {
        let (state, memes, storage) = fixture();
        let meme = submit_meme(&state, &request(json!("data:image/png;base64,aGVsbG8="), json!(5)))
            .await
            .unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap().timestamp_millis();
        let key = format!("meme_{}.png", ts);
        assert_eq!(meme.image_url, format!("http://storage/memes/{}", key));
        assert_eq!(meme.vote_count, 0);
        assert_eq!(memes.get(meme.id), Some(meme));
        assert_eq!(
            storage.object(&key),
            Some((b"hello".to_vec(), Some("image/png".to_string())))
        );
    }

    #[tokio::test]
    async fn validation_happens_before_upload() {
        let (state, _, storage) = fixture();

        let wrong = submit_meme(&state, &request(json!("data:image/png;base64,aGVsbG8="), json!("6"))).await;
        assert!(matches!(wrong, Err(SubmitError::Captcha(CaptchaError::Incorrect))));

        let missing = submit_meme(&state, &request(json!("data:image/png;base64,aGVsbG8="), Value::Null)).await;
        assert!(matches!(missing, Err(SubmitError::MissingCaptcha)));

        let not_string = submit_meme(&state, &request(json!(42), json!(5))).await;
        assert!(matches!(not_string, Err(SubmitError::Image(ImageError::MissingData))));

        let bad_format = submit_meme(&state, &request(json!("hello"), json!(5))).await;
        assert!(matches!(bad_format, Err(SubmitError::Image(ImageError::InvalidFormat))));

        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn failed_insert_removes_upload() {
        let (state, memes, storage) = fixture();
        memes.fail_creates(true);

        let result = submit_meme(&state, &request(json!("data:image/png;base64,aGVsbG8="), json!(5))).await;
        assert!(matches!(result, Err(SubmitError::SaveFailed(_))));
        assert!(storage.keys().is_empty());
        assert!(memes.is_empty());
    }

    #[tokio::test]
    async fn failed_cleanup_is_reported_separately() {
        let (state, memes, storage) = fixture();
        memes.fail_creates(true);
        storage.fail_deletes(true);

        let result = submit_meme(&state, &request(json!("data:image/png;base64,aGVsbG8="), json!(5))).await;
        assert!(matches!(result, Err(SubmitError::Unreconciled { .. })));
        assert_eq!(storage.keys().len(), 1);
    }

    #[tokio::test]
    async fn failed_upload_stops_early() {
        let (state, memes, storage) = fixture();
        storage.fail_uploads(true);

        let result = submit_meme(&state, &request(json!("data:image/png;base64,aGVsbG8="), json!(5))).await;
        assert!(matches!(result, Err(SubmitError::Upload(_))));
        assert!(memes.is_empty());
    }
}
