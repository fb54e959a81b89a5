//! Variable interpolation for command strings
//!
//! `${NAME}` is replaced with the context's environment variable `NAME`, and
//! `${outputs.TASK.KEY}` with output `KEY` recorded by an earlier task.
//! Unknown references are left untouched so the shell can still see them.

use crate::error::{InterpolationError, InterpolationResult};
use crate::runner::Context;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{}]+)\}").expect("valid interpolation pattern"));

/// Upper bound on nested substitution passes
const MAX_PASSES: usize = 16;

/// Interpolate variables in a string
pub fn interpolate(s: &str, ctx: &Context) -> InterpolationResult<String> {
    let mut result = s.to_string();

    for _ in 0..MAX_PASSES {
        let mut changed = false;
        let next = VAR_PATTERN
            .replace_all(&result, |caps: &Captures| match lookup(&caps[1], ctx) {
                Some(value) => {
                    changed = true;
                    value
                }
                None => caps[0].to_string(),
            })
            .into_owned();

        if !changed {
            return Ok(next);
        }
        result = next;
    }

    Err(InterpolationError::RecursiveInterpolation(s.to_string()))
}

/// Interpolate a list of strings
pub fn interpolate_list(list: &[String], ctx: &Context) -> InterpolationResult<Vec<String>> {
    list.iter().map(|s| interpolate(s, ctx)).collect()
}

fn lookup(name: &str, ctx: &Context) -> Option<String> {
    if let Some(value) = ctx.env_var(name) {
        return Some(value.to_string());
    }

    let rest = name.strip_prefix("outputs.")?;
    let (task, key) = rest.split_once('.')?;
    ctx.outputs(task)?.get(key).map(render_value)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
