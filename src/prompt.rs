use crate::{
    ast::{InvocationCtx, Value, format_number},
    error::{FramescriptError, FramescriptResult},
    model::PromptSpec,
    parser::parse,
};

/// Expand every `${expr}` placeholder in prompt text through the expression
/// language. Numeric results are formatted to 5 decimals; string results are
/// substituted verbatim.
pub fn expand_placeholders(text: &str, ctx: &InvocationCtx<'_>) -> FramescriptResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            FramescriptError::evaluation(format!("unterminated '${{' placeholder in prompt: {text}"))
        })?;
        let expr = &after[..end];
        let ast = parse(expr, ctx.library)
            .map_err(|e| e.for_field("deforum_prompt", ctx.frame, expr))?;
        let value = ast
            .invoke(ctx)
            .map_err(|e| e.for_field("deforum_prompt", ctx.frame, expr))?;
        match value {
            Value::Number(n) => out.push_str(&format!("{n:.5}")),
            Value::Str(s) => out.push_str(&s),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Compose the prompt in force at a frame. A single active segment is used
/// verbatim; overlapping segments are joined with " AND ", each suffixed by
/// its evaluated weight. Negative halves compose the same way behind
/// " --neg ".
pub fn compose_prompt(
    prompts: &[PromptSpec],
    frame: i64,
    ctx: &InvocationCtx<'_>,
) -> FramescriptResult<String> {
    let active: Vec<&PromptSpec> = prompts.iter().filter(|p| p.covers(frame)).collect();

    let (positive, negative) = match active.as_slice() {
        [] => return Ok(String::new()),
        [only] => (
            expand_placeholders(&only.positive, ctx)?,
            expand_placeholders(&only.negative, ctx)?,
        ),
        many => {
            let mut pos = Vec::new();
            let mut neg = Vec::new();
            for p in many {
                let w = segment_weight(p, ctx)?;
                let text = expand_placeholders(&p.positive, ctx)?;
                if !text.trim().is_empty() {
                    pos.push(format!("{text} : {w}"));
                }
                let text = expand_placeholders(&p.negative, ctx)?;
                if !text.trim().is_empty() {
                    neg.push(format!("{text} : {w}"));
                }
            }
            (pos.join(" AND "), neg.join(" AND "))
        }
    };

    if negative.trim().is_empty() {
        Ok(positive)
    } else {
        Ok(format!("{positive} --neg {negative}"))
    }
}

fn segment_weight(p: &PromptSpec, ctx: &InvocationCtx<'_>) -> FramescriptResult<String> {
    if p.weight.trim().is_empty() {
        return Ok("1".to_string());
    }
    let ast = parse(&p.weight, ctx.library)
        .map_err(|e| e.for_field("deforum_prompt", ctx.frame, p.weight.as_str()))?;
    let value = ast
        .invoke(ctx)
        .map_err(|e| e.for_field("deforum_prompt", ctx.frame, p.weight.as_str()))?;
    Ok(match value {
        Value::Number(n) => format_number(n),
        Value::Str(s) => s,
    })
}
