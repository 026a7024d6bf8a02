//! Per-request helpers: caller IP resolution and image payload checks.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use std::{convert::Infallible, net::SocketAddr};
use thiserror::Error;

pub const LOOPBACK: &str = "127.0.0.1";

/// Decoded-size ceiling for submitted images (5 MiB).
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const DATA_URL_PREFIX: &str = "data:image/";

/// First non-empty of `x-forwarded-for`, `x-real-ip`, the peer address,
/// else loopback. Header values are used verbatim, proxy lists included.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    ["x-forwarded-for", "x-real-ip"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| LOOPBACK.to_string())
}

/// Caller IP as resolved by [`resolve_client_ip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(resolve_client_ip(&parts.headers, peer)))
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image data is missing or invalid")]
    MissingData,
    #[error("Invalid image format")]
    InvalidFormat,
    #[error("Image is too large (max 5MB)")]
    TooLarge,
}

/// Cheap admission check on a `data:image/...` payload.
///
/// The size is estimated as `len * 3 / 4` over the whole string, header
/// included, so it slightly overestimates the decoded size.
pub fn validate_image_data(data: Option<&str>) -> Result<(), ImageError> {
    let data = data.ok_or(ImageError::MissingData)?;
    if data.is_empty() {
        return Err(ImageError::MissingData);
    }
    if !data.starts_with(DATA_URL_PREFIX) {
        return Err(ImageError::InvalidFormat);
    }
    // len * 3 / 4 > MAX, kept in integers
    if data.len().saturating_mul(3) > MAX_IMAGE_BYTES * 4 {
        return Err(ImageError::TooLarge);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Subtype from the data URL, e.g. `png`.
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    pub fn content_type(&self) -> String {
        mime_guess::from_ext(&self.extension)
            .first_raw()
            .map(str::to_string)
            .unwrap_or_else(|| format!("image/{}", self.extension))
    }
}

/// Splits `data:image/<type>;base64,<payload>` and decodes the payload.
pub fn decode_image_data(data: &str) -> Result<DecodedImage, ImageError> {
    let rest = data.strip_prefix(DATA_URL_PREFIX).ok_or(ImageError::InvalidFormat)?;
    let (extension, payload) = rest.split_once(";base64,").ok_or(ImageError::InvalidFormat)?;
    if !extension.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ImageError::InvalidFormat);
    }
    let bytes = general_purpose::STANDARD
        .decode(payload.trim_end())
        .map_err(|_| ImageError::InvalidFormat)?;

    Ok(DecodedImage {
        extension: extension.to_string(),
        bytes,
    })
}
