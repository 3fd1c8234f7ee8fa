//! The fixed call interface of the deployed TimeStore contract.

use serde::Deserialize;

use crate::abi::{self, AbiError};
use crate::message::{StoredMessage, SubmissionRequest};

pub const STORE_MSG_SIGNATURE: &str = "storeMsg(string,uint256)";
pub const GET_MSG_TIMED_SIGNATURE: &str = "getMsgTimed()";
/// Canonical return type of `getMsgTimed()`.
pub const GET_MSG_TIMED_OUTPUT: &str = "(uint256,uint256,string)[]";

/// A single contract function, identified by its canonical signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractFunction {
    pub signature: String,
    pub selector: [u8; 4],
}

impl ContractFunction {
    pub fn new(signature: &str) -> Self {
        Self {
            signature: signature.to_string(),
            selector: abi::selector(signature),
        }
    }
}

/// Everything the client needs to talk to the contract besides its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub store_msg: ContractFunction,
    pub get_msg_timed: ContractFunction,
}

impl Default for InterfaceDescriptor {
    fn default() -> Self {
        Self::time_store()
    }
}

impl InterfaceDescriptor {
    /// The built-in descriptor matching the deployed contract.
    pub fn time_store() -> Self {
        Self {
            store_msg: ContractFunction::new(STORE_MSG_SIGNATURE),
            get_msg_timed: ContractFunction::new(GET_MSG_TIMED_SIGNATURE),
        }
    }

    /// Build from a compiler artifact (`{"abi": [...]}`) or a bare ABI array,
    /// checking that both functions exist with the expected shapes.
    pub fn from_abi_json(json: &str) -> Result<Self, AbiError> {
        let artifact: Artifact =
            serde_json::from_str(json).map_err(|e| AbiError::InvalidDescriptor(e.to_string()))?;
        let entries = match artifact {
            Artifact::Compiled { abi } => abi,
            Artifact::Bare(abi) => abi,
        };

        let store = find_function(&entries, "storeMsg")?;
        let store_sig = store.signature();
        if store_sig != STORE_MSG_SIGNATURE {
            return Err(AbiError::SignatureMismatch {
                expected: STORE_MSG_SIGNATURE.into(),
                found: store_sig,
            });
        }

        let get = find_function(&entries, "getMsgTimed")?;
        let get_sig = get.signature();
        let outputs = canonical_list(&get.outputs);
        if get_sig != GET_MSG_TIMED_SIGNATURE || outputs != GET_MSG_TIMED_OUTPUT {
            return Err(AbiError::SignatureMismatch {
                expected: format!("{GET_MSG_TIMED_SIGNATURE} returns ({GET_MSG_TIMED_OUTPUT})"),
                found: format!("{get_sig} returns ({outputs})"),
            });
        }

        Ok(Self::time_store())
    }

    pub fn encode_store(&self, request: &SubmissionRequest) -> Vec<u8> {
        abi::encode_store_msg(self.store_msg.selector, request.text(), request.unlock_at())
    }

    pub fn encode_fetch(&self) -> Vec<u8> {
        abi::encode_no_args(self.get_msg_timed.selector)
    }

    pub fn decode_fetch(&self, data: &[u8]) -> Result<Vec<StoredMessage>, AbiError> {
        abi::decode_messages(data)
    }
}

// ─── ABI JSON ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum Artifact {
    Compiled { abi: Vec<AbiEntry> },
    Bare(Vec<AbiEntry>),
}

#[derive(Deserialize)]
struct AbiEntry {
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<AbiParam>,
    #[serde(default)]
    outputs: Vec<AbiParam>,
}

#[derive(Deserialize)]
struct AbiParam {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    components: Vec<AbiParam>,
}

fn function_kind() -> String {
    "function".into()
}

impl AbiEntry {
    fn signature(&self) -> String {
        format!("{}({})", self.name, canonical_list(&self.inputs))
    }
}

impl AbiParam {
    /// `tuple[]` with components becomes `(uint256,...)[]`.
    fn canonical(&self) -> String {
        match self.kind.strip_prefix("tuple") {
            Some(suffix) => format!("({}){}", canonical_list(&self.components), suffix),
            None => self.kind.clone(),
        }
    }
}

fn canonical_list(params: &[AbiParam]) -> String {
    params
        .iter()
        .map(AbiParam::canonical)
        .collect::<Vec<_>>()
        .join(",")
}

fn find_function<'a>(entries: &'a [AbiEntry], name: &str) -> Result<&'a AbiEntry, AbiError> {
    entries
        .iter()
        .find(|e| e.kind == "function" && e.name == name)
        .ok_or_else(|| AbiError::MissingFunction(name.to_string()))
}
