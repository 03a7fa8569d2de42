//! Chained chunk signing for outbound frames.
//!
//! Every outbound event is wrapped in an envelope frame carrying `:date`
//! and `:chunk-signature`. Each chunk signature covers the envelope's
//! encoded `:date` header, its payload and the previous chunk's signature;
//! the first chunk chains from the signature of the HTTP request that
//! opened the stream.
//!
//! [`StreamSigner`] builds signed envelopes; [`EventSigner`] is the seam
//! computing signatures, implemented for AWS SigV4 by [`SigV4ChunkSigner`].

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use eventstream_core::{Frame, HeaderValue, Headers, header_names};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::StreamError;

type HmacSha256 = Hmac<Sha256>;

const PAYLOAD_ALGORITHM: &str = "AWS4-HMAC-SHA256-PAYLOAD";
const SCOPE_TERMINATOR: &str = "aws4_request";

/// AWS credentials used to derive signing keys.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

/// Computes per-chunk signatures.
///
/// Implementations are stateful: each call chains from the previous one,
/// so calls must happen in frame order.
pub trait EventSigner: Send + 'static {
    fn sign(
        &mut self,
        headers: &[u8],
        payload: &[u8],
        signing_time: DateTime<Utc>,
    ) -> Result<Vec<u8>, StreamError>;
}

/// SigV4 event-stream chunk signer.
pub struct SigV4ChunkSigner {
    credentials: Credentials,
    region: String,
    service: String,
    prior_signature: Vec<u8>,
}

impl SigV4ChunkSigner {
    /// Create a signer chained from `seed_signature`, the raw bytes of the
    /// initiating request's signature.
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        service: impl Into<String>,
        seed_signature: Vec<u8>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
            prior_signature: seed_signature,
        }
    }

    /// The signature the next chunk will chain from.
    pub fn prior_signature(&self) -> &[u8] {
        &self.prior_signature
    }

    fn credential_scope(&self, date: &str) -> String {
        format!(
            "{date}/{}/{}/{SCOPE_TERMINATOR}",
            self.region, self.service
        )
    }

    fn string_to_sign(
        &self,
        headers: &[u8],
        payload: &[u8],
        signing_time: DateTime<Utc>,
    ) -> String {
        let timestamp = signing_time.format("%Y%m%dT%H%M%SZ");
        let date = signing_time.format("%Y%m%d").to_string();
        format!(
            "{PAYLOAD_ALGORITHM}\n{timestamp}\n{}\n{}\n{}\n{}",
            self.credential_scope(&date),
            hex::encode(&self.prior_signature),
            hex::encode(Sha256::digest(headers)),
            hex::encode(Sha256::digest(payload)),
        )
    }
}

impl fmt::Debug for SigV4ChunkSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigV4ChunkSigner")
            .field("credentials", &self.credentials)
            .field("region", &self.region)
            .field("service", &self.service)
            .field("prior_signature", &hex::encode(&self.prior_signature))
            .finish()
    }
}

impl EventSigner for SigV4ChunkSigner {
    fn sign(
        &mut self,
        headers: &[u8],
        payload: &[u8],
        signing_time: DateTime<Utc>,
    ) -> Result<Vec<u8>, StreamError> {
        let date = signing_time.format("%Y%m%d").to_string();
        let key = derive_signing_key(
            &self.credentials.secret_access_key,
            &date,
            &self.region,
            &self.service,
        )?;
        let string_to_sign = self.string_to_sign(headers, payload, signing_time);
        let signature = hmac_sha256(&key, string_to_sign.as_bytes())?;
        self.prior_signature = signature.clone();
        Ok(signature)
    }
}

/// Derive the SigV4 signing key for a date, region and service.
pub fn derive_signing_key(
    secret_access_key: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, StreamError> {
    let k_date = hmac_sha256(format!("AWS4{secret_access_key}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StreamError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StreamError::Signing(format!("invalid HMAC key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Builds signed envelope frames around already-encoded events.
///
/// Owned by exactly one writer task; the chained state inside the
/// [`EventSigner`] is never shared.
#[derive(Debug)]
pub struct StreamSigner<G = SigV4ChunkSigner> {
    signer: G,
}

impl<G: EventSigner> StreamSigner<G> {
    pub fn new(signer: G) -> Self {
        Self { signer }
    }

    /// Sign `payload` at the current time.
    pub fn sign_event(&mut self, payload: &[u8]) -> Result<Bytes, StreamError> {
        self.sign_event_at(payload, Utc::now())
    }

    /// Sign `payload` at `signing_time`, returning the encoded envelope.
    ///
    /// An empty payload produces the end-of-stream marker.
    pub fn sign_event_at(
        &mut self,
        payload: &[u8],
        signing_time: DateTime<Utc>,
    ) -> Result<Bytes, StreamError> {
        let mut headers = Headers::new();
        headers.set(
            header_names::DATE,
            HeaderValue::Timestamp(signing_time.timestamp_millis()),
        );
        let encoded_headers = headers.to_bytes()?;

        let signature = self.signer.sign(&encoded_headers, payload, signing_time)?;
        headers.set(
            header_names::CHUNK_SIGNATURE,
            HeaderValue::ByteArray(Bytes::from(signature)),
        );

        Ok(Frame::new(headers, Bytes::copy_from_slice(payload)).encode()?)
    }

    pub fn inner(&self) -> &G {
        &self.signer
    }
}

/// Extract the seed signature from a SigV4-signed request's
/// `Authorization` header.
pub fn seed_signature_from_headers(headers: &http::HeaderMap) -> Result<Vec<u8>, StreamError> {
    let authorization = headers
        .get(http::header::AUTHORIZATION)
        .ok_or_else(|| StreamError::Signing("request is not signed".into()))?
        .to_str()
        .map_err(|e| StreamError::Signing(format!("invalid authorization header: {e}")))?;

    let signature = authorization
        .split(',')
        .find_map(|part| part.trim().strip_prefix("Signature="))
        .ok_or_else(|| {
            StreamError::Signing("authorization header carries no signature".into())
        })?;

    hex::decode(signature.trim())
        .map_err(|e| StreamError::Signing(format!("invalid request signature: {e}")))
}
