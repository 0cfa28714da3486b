//! Serialization policy for the application state carried by an object.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{GaoError, GaoResult};

/// Application state that can be sealed into a container.
pub trait GaoState: Send + Sync + 'static {
    fn pack(&self) -> GaoResult<Vec<u8>>;

    fn unpack(data: &[u8]) -> GaoResult<Self>
    where
        Self: Sized;
}

/// Opaque bytes, stored as-is.
impl GaoState for Vec<u8> {
    fn pack(&self) -> GaoResult<Vec<u8>> {
        Ok(self.clone())
    }

    fn unpack(data: &[u8]) -> GaoResult<Self> {
        Ok(data.to_vec())
    }
}

/// Any serde type, stored as JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JsonState<T>(pub T);

impl<T> GaoState for JsonState<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn pack(&self) -> GaoResult<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| GaoError::State(e.to_string()))
    }

    fn unpack(data: &[u8]) -> GaoResult<Self> {
        serde_json::from_slice(data)
            .map(JsonState)
            .map_err(|e| GaoError::State(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn raw_bytes_are_untouched() {
        let state = vec![0u8, 1, 2, 255];
        assert_eq!(state.pack().unwrap(), state);
        assert_eq!(Vec::<u8>::unpack(&state).unwrap(), state);
    }

    #[test]
    fn json_state_roundtrip() {
        let mut map = BTreeMap::new();
        map.insert("greeting".to_string(), 1u32);
        let state = JsonState(map);
        let restored = JsonState::<BTreeMap<String, u32>>::unpack(&state.pack().unwrap()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn json_state_rejects_garbage() {
        assert!(matches!(
            JsonState::<Vec<String>>::unpack(b"\xff not json"),
            Err(GaoError::State(_))
        ));
    }
}
