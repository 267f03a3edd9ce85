//! Inbound command schema.
//!
//! A command names a unit by `service` (namespace) and `method` (operation),
//! carries an optional parameter payload and the caller's identity/address,
//! and is authenticated by `signature`, computed over every other field.

use serde::{Deserialize, Serialize};

use crate::signing::Signer;

/// A decoded client command.
///
/// All fields are optional on the wire so that a malformed command still
/// decodes and can be answered with a parameter error instead of a transport
/// failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Command {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub param: Option<rmpv::Value>,
    /// Caller identity. Empty means unauthenticated.
    #[serde(default)]
    pub operator: String,
    /// Caller address, the admission-control key.
    #[serde(default)]
    pub ip: String,
}

impl Command {
    /// Unsigned command addressed to `service`/`method`.
    #[must_use]
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
            method: Some(method.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_param(mut self, param: rmpv::Value) -> Self {
        self.param = Some(param);
        self
    }

    #[must_use]
    pub fn with_caller(mut self, operator: impl Into<String>, ip: impl Into<String>) -> Self {
        self.operator = operator.into();
        self.ip = ip.into();
        self
    }

    /// Replaces the signature with one computed by `signer`.
    #[must_use]
    pub fn signed(mut self, signer: &dyn Signer) -> Self {
        self.signature = Some(signer.sign(&self.signing_payload()));
        self
    }

    /// Canonical string the signature is computed over.
    ///
    /// Fields appear in a fixed order, each as `name=len:value;`, so no two
    /// distinct commands share a payload. `signature` never participates.
    /// An explicit nil `param` signs the same as an absent one, since the
    /// wire decodes both to `None`.
    #[must_use]
    pub fn signing_payload(&self) -> String {
        let param = self
            .param
            .as_ref()
            .filter(|v| !v.is_nil())
            .map(ToString::to_string)
            .unwrap_or_default();
        let fields: [(&str, &str); 5] = [
            ("ip", &self.ip),
            ("method", self.method.as_deref().unwrap_or_default()),
            ("operator", &self.operator),
            ("param", &param),
            ("service", self.service.as_deref().unwrap_or_default()),
        ];

        let mut out = String::new();
        for (name, value) in fields {
            out.push_str(name);
            out.push('=');
            out.push_str(&value.len().to_string());
            out.push(':');
            out.push_str(value);
            out.push(';');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::Sha256Signer;

    #[test]
    fn signing_payload_excludes_signature() {
        let cmd = Command::new("orders", "view").with_caller("u1", "127.0.0.1");
        let mut signed = cmd.clone();
        signed.signature = Some("anything".to_string());
        assert_eq!(cmd.signing_payload(), signed.signing_payload());
    }

    #[test]
    fn signing_payload_is_unambiguous() {
        let a = Command {
            ip: "1&method=a".to_string(),
            method: Some("b".to_string()),
            ..Command::default()
        };
        let b = Command {
            ip: "1".to_string(),
            method: Some("a&method=b".to_string()),
            ..Command::default()
        };
        assert_ne!(a.signing_payload(), b.signing_payload());
    }

    #[test]
    fn signing_payload_layout() {
        let cmd = Command::new("orders", "view").with_caller("u1", "10.0.0.1");
        assert_eq!(
            cmd.signing_payload(),
            "ip=8:10.0.0.1;method=4:view;operator=2:u1;param=0:;service=6:orders;"
        );
    }

    #[test]
    fn nil_param_signs_like_absent_param() {
        let absent = Command::new("orders", "view").with_caller("u1", "10.0.0.1");
        let nil = absent.clone().with_param(rmpv::Value::Nil);
        assert_eq!(nil.signing_payload(), absent.signing_payload());
    }

    #[test]
    fn param_changes_signature() {
        let signer = Sha256Signer::default();
        let plain = Command::new("orders", "view").signed(&signer);
        let with_param = Command::new("orders", "view")
            .with_param(rmpv::Value::from(1))
            .signed(&signer);
        assert_ne!(plain.signature, with_param.signature);
    }

    #[test]
    fn signed_sets_signature_from_payload() {
        let signer = Sha256Signer::default();
        let cmd = Command::new("orders", "view")
            .with_caller("u1", "127.0.0.1")
            .signed(&signer);
        assert_eq!(
            cmd.signature.as_deref(),
            Some(signer.sign(&cmd.signing_payload()).as_str())
        );
    }
}
