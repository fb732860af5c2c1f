//! One request per stdin line, one JSON response per stdout line.

use fedledger_core::{ContractError, FederatedContract, Invocation, LedgerBackend};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok { ok: bool, result: Value },
    Err { ok: bool, kind: &'static str, error: String },
}

impl Response {
    fn ok(result: Value) -> Self { Response::Ok { ok: true, result } }

    fn err(kind: &'static str, error: impl ToString) -> Self {
        Response::Err { ok: false, kind, error: error.to_string() }
    }
}

impl From<ContractError> for Response {
    fn from(e: ContractError) -> Self { Response::err(e.kind(), e) }
}

/// Blank lines yield `None`; anything else gets exactly one response.
pub fn handle_line<B: LedgerBackend>(
    contract: &FederatedContract<B>,
    line: &str,
) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let response = match serde_json::from_str::<Invocation>(line) {
        Ok(invocation) => {
            debug!(function = %invocation.function, args = invocation.args.len(), "invocation");
            match contract.invoke(&invocation) {
                Ok(result) => Response::ok(result),
                Err(e) => e.into(),
            }
        }
        Err(e) => Response::err("MalformedRequest", e),
    };
    Some(serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(r#"{{"ok":false,"kind":"EncodeError","error":{:?}}}"#, e.to_string())
    }))
}
