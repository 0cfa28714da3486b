//! State format of objects routed by the dispatcher.
//!
//! ```text
//! b"hgxd" | version (0x00) | api id (32 bytes) | application body
//! ```

use hgx_core::{GaoError, GaoResult, GaoState};
use hgx_types::ApiId;

use crate::error::{DispatchError, DispatchResult};

const MAGIC: &[u8; 4] = b"hgxd";
const VERSION: u8 = 0x00;
const HEADER_LEN: usize = MAGIC.len() + 1 + ApiId::LEN;

/// Application state tagged with the API identifier it was written for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchableState {
    pub api_id: ApiId,
    pub body: Vec<u8>,
}

impl DispatchableState {
    pub fn new(api_id: ApiId, body: impl Into<Vec<u8>>) -> Self {
        Self {
            api_id,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.body.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(self.api_id.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    pub fn decode(data: &[u8]) -> DispatchResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(DispatchError::Format(format!(
                "{} bytes is shorter than the {HEADER_LEN}-byte header",
                data.len()
            )));
        }
        if &data[..4] != MAGIC {
            return Err(DispatchError::Format(
                "object does not appear to be dispatchable".into(),
            ));
        }
        if data[4] != VERSION {
            return Err(DispatchError::Format(format!(
                "incompatible dispatchable version {}",
                data[4]
            )));
        }
        let api_id = ApiId::from_slice(&data[5..HEADER_LEN])
            .map_err(|e| DispatchError::Format(e.to_string()))?;
        Ok(Self {
            api_id,
            body: data[HEADER_LEN..].to_vec(),
        })
    }
}

/// Placeholder until the first pull applies the real state.
impl Default for DispatchableState {
    fn default() -> Self {
        Self {
            api_id: ApiId::from_raw([0u8; ApiId::LEN]),
            body: Vec::new(),
        }
    }
}

impl GaoState for DispatchableState {
    fn pack(&self) -> GaoResult<Vec<u8>> {
        Ok(self.encode())
    }

    fn unpack(data: &[u8]) -> GaoResult<Self> {
        Self::decode(data).map_err(|e| GaoError::State(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let api = ApiId::derive("notes.v1");
        let bytes = DispatchableState::new(api, b"body".to_vec()).encode();
        assert_eq!(&bytes[..5], b"hgxd\x00");
        assert_eq!(&bytes[5..37], api.as_bytes());
        assert_eq!(&bytes[37..], b"body");
        assert_eq!(DispatchableState::decode(&bytes).unwrap().body, b"body");
    }

    #[test]
    fn empty_body_is_valid() {
        let state = DispatchableState::new(ApiId::derive("x"), Vec::new());
        assert_eq!(DispatchableState::unpack(&state.pack().unwrap()).unwrap(), state);
    }

    #[test]
    fn rejects_bad_magic_version_and_length() {
        let mut bytes = DispatchableState::new(ApiId::derive("x"), b"b".to_vec()).encode();
        bytes[4] = 1;
        assert!(matches!(
            DispatchableState::decode(&bytes),
            Err(DispatchError::Format(_))
        ));
        bytes[0] = b'X';
        assert!(matches!(
            DispatchableState::decode(&bytes),
            Err(DispatchError::Format(_))
        ));
        assert!(matches!(
            DispatchableState::unpack(b"hgxd\x00short"),
            Err(GaoError::State(_))
        ));
    }
}
