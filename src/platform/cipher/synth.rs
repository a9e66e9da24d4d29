//! Minimal program synthesis.
//!
//! Re-emits just the transform function and its helper object so the sandbox
//! never sees the rest of the script.

use super::parser::{find_helper, find_transform_functions};
use crate::error::CipherError;
use crate::Result;

/// Build a self-contained program exposing the transform as `entry_point`
pub fn synthesize(script: &str, entry_point: &str) -> Result<String> {
    let mut last_err = None;

    for function in find_transform_functions(script) {
        let helper = match find_helper(script, &function) {
            Ok(helper) => helper,
            Err(err) => {
                last_err = Some(err);
                continue;
            }
        };

        let p = &function.param;
        let calls = function.inner_statements().join(";");
        return Ok(format!(
            "var {obj}={literal};\nfunction {entry}({p}){{{p}={p}.split(\"\");{calls};return {p}.join(\"\")}}",
            obj = helper.name,
            literal = helper.literal,
            entry = entry_point,
        ));
    }

    Err(last_err.unwrap_or_else(|| {
        CipherError::NotFound("no transform function to synthesize from".into())
    }))
}
