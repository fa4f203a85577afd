//! Interfaces to the external code generator.
//!
//! The core treats generated values opaquely: a [`Register`] is either a
//! string (a local path when it feeds an import) or a [`Filesystem`] whose
//! content digest addresses a remote module.

use crate::{ast::Expr, error::Result, kind::Kind, scope::Scope, Context};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::{fmt, str::FromStr, sync::Arc};

/// The canonical platform filesystem definitions are marshalled for, so
/// digests are stable across hosts and registry mutations.
pub const CANONICAL_PLATFORM: Platform =
    Platform { os: "linux", arch: "amd64" };

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
}

/// A content digest, rendered `algo:hex`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(into = "String", try_from = "String")]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    pub fn sha256(bytes: &[u8]) -> Self {
        let mut hasher = sha2::Sha256::new();
        hasher.update(bytes);
        Self { algorithm: "sha256".to_string(), hex: hex::encode(hasher.finalize()) }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| crate::error::Error::msg(format!("invalid digest {s:?}")))?;
        if algorithm.is_empty() || hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(crate::error::Error::msg(format!("invalid digest {s:?}")));
        }
        Ok(Self { algorithm: algorithm.to_string(), hex: hex.to_ascii_lowercase() })
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

impl TryFrom<String> for Digest {
    type Error = crate::error::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A filesystem value produced by evaluating an expression: the marshalled
/// definition of a build graph the external engine can solve.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Filesystem {
    platform: Platform,
    definition: serde_json::Value,
}

impl Filesystem {
    pub fn new(definition: serde_json::Value) -> Self {
        Self { platform: CANONICAL_PLATFORM, definition }
    }

    pub fn definition(&self) -> &serde_json::Value {
        &self.definition
    }

    /// The content digest of the canonical marshalling. `serde_json` maps
    /// iterate in key order, so the encoding is deterministic.
    pub fn digest(&self) -> Digest {
        let bytes = serde_json::to_vec(self).expect("filesystem definition serializes");
        Digest::sha256(&bytes)
    }
}

/// A typed value returned by the code generator.
#[derive(Clone, Debug, PartialEq)]
pub enum Register {
    String(String),
    Filesystem(Filesystem),
}

impl Register {
    pub fn kind(&self) -> Kind {
        match self {
            Register::String(_) => Kind::string(),
            Register::Filesystem(_) => Kind::fs(),
        }
    }
}

/// The external code generator, consumed by the resolver and the linter's
/// recursive mode to evaluate import expressions.
pub trait CodeGenerator: Send + Sync {
    fn emit_expr(&self, ctx: &Context, scope: &Arc<Scope>, expr: &Expr) -> Result<Register>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn digest_is_stable() {
        let a = Filesystem::new(json!({"op": "image", "ref": "alpine"}));
        let b = Filesystem::new(json!({"ref": "alpine", "op": "image"}));
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().algorithm(), "sha256");
        assert_eq!(a.digest().hex().len(), 64);
    }

    #[test]
    fn different_definitions_different_digests() {
        let a = Filesystem::new(json!({"op": "image", "ref": "alpine"}));
        let b = Filesystem::new(json!({"op": "image", "ref": "busybox"}));
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn digest_parses_and_displays() {
        let digest = Digest::sha256(b"hello");
        let parsed: Digest = digest.to_string().parse().unwrap();
        assert_eq!(parsed, digest);
        assert!("nocolon".parse::<Digest>().is_err());
        assert!("sha256:zz".parse::<Digest>().is_err());
    }

    #[test]
    fn register_kinds() {
        assert_eq!(Register::String("./x.hlb".into()).kind(), Kind::string());
        let fs = Register::Filesystem(Filesystem::new(json!({"op": "scratch"})));
        assert_eq!(fs.kind(), Kind::fs());
    }
}
