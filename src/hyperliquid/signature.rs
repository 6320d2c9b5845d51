use alloy::primitives::{Signature, U256};
use serde::Serialize;

/// Signature split into the `{r, s, v}` form the exchange endpoint expects,
/// with `v` in legacy `27`/`28` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignatureParts {
    pub r: U256,
    pub s: U256,
    pub v: u8,
}

impl From<Signature> for SignatureParts {
    fn from(signature: Signature) -> Self {
        Self {
            r: signature.r(),
            s: signature.s(),
            v: 27 + u8::from(signature.v()),
        }
    }
}
