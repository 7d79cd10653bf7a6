//! Human-readable contract manifest.
//!
//! The manifest lists every operation with its signature and descriptor
//! strings. It is meant for logs and diagnostics, e.g. to see which side of
//! a failed handshake drifted:
//!
//! ```json
//! {
//!   "signature": "5c1e…",
//!   "operations": [
//!     { "name": "factorial", "signature": "9a0b…", "arguments": ["Int"], "returns": "Int" }
//!   ]
//! }
//! ```

use serde::Serialize;

use super::Contract;

/// One operation entry of a [`ContractManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationManifest {
    pub name: String,
    /// Hex-encoded operation signature.
    pub signature: String,
    pub arguments: Vec<String>,
    pub returns: String,
}

/// Serializable description of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractManifest {
    /// Hex-encoded aggregate signature.
    pub signature: String,
    /// Operations in declaration order.
    pub operations: Vec<OperationManifest>,
}

impl ContractManifest {
    pub fn from_contract(contract: &Contract) -> Self {
        let operations = contract
            .operations()
            .iter()
            .map(|op| OperationManifest {
                name: op.name().to_string(),
                signature: op.signature().to_hex(),
                arguments: op.args().iter().map(ToString::to_string).collect(),
                returns: op.returns().to_string(),
            })
            .collect();

        Self {
            signature: contract.signature().to_hex(),
            operations,
        }
    }

    pub fn operation(&self, name: &str) -> Option<&OperationManifest> {
        self.operations.iter().find(|op| op.name == name)
    }
}

impl Contract {
    pub fn manifest(&self) -> ContractManifest {
        ContractManifest::from_contract(self)
    }

    /// Manifest rendered as one JSON line.
    pub fn manifest_json(&self) -> serde_json::Result<String> {
        build_manifest_json(self)
    }
}

/// Render a contract's manifest as a single JSON line.
pub fn build_manifest_json(contract: &Contract) -> serde_json::Result<String> {
    serde_json::to_string(&contract.manifest())
}
