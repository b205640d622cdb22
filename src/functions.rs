use std::collections::BTreeMap;
use std::f64::consts::TAU;

use crate::{
    ast::{CallArg, InvocationCtx, Value},
    error::{FramescriptError, FramescriptResult},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgType {
    Number,
    String,
}

impl ArgType {
    fn name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
        }
    }

    fn matches(self, v: &Value) -> bool {
        matches!(
            (self, v),
            (Self::Number, Value::Number(_)) | (Self::String, Value::Str(_))
        )
    }
}

/// Default for an optional argument. Some defaults depend on the invocation
/// context (interpolation functions anchor on the surrounding keyframes).
#[derive(Clone, Copy, Debug)]
pub enum ArgDefault {
    Number(f64),
    /// The field's defined value at the active keyframe.
    ActiveKeyframeValue,
    /// Frames between the active keyframe and the next defined keyframe.
    FramesToNextKeyframe,
    /// A seed derived from the current frame.
    FrameSeed,
}

impl ArgDefault {
    fn resolve(self, ctx: &InvocationCtx<'_>) -> Value {
        match self {
            Self::Number(n) => Value::Number(n),
            Self::ActiveKeyframeValue => Value::Number(ctx.active_keyframe_value()),
            Self::FramesToNextKeyframe => {
                Value::Number((ctx.next_keyframe() - ctx.active_keyframe) as f64)
            }
            Self::FrameSeed => Value::Number(ctx.frame as f64),
        }
    }
}

pub struct ArgDef {
    /// Accepted names, canonical first (e.g. `["period", "p"]`).
    pub names: &'static [&'static str],
    pub arg_type: ArgType,
    pub required: bool,
    pub default: Option<ArgDefault>,
}

impl ArgDef {
    fn canonical(&self) -> &'static str {
        self.names[0]
    }

    fn accepts(&self, name: &str) -> bool {
        self.names.contains(&name)
    }
}

type NativeFn = fn(&InvocationCtx<'_>, &[Value]) -> FramescriptResult<Value>;

pub struct FunctionSpec {
    pub description: &'static str,
    pub args: &'static [ArgDef],
    call: NativeFn,
}

impl FunctionSpec {
    /// Human-readable signature used in argument errors, e.g.
    /// `min(a: number, b: number)`.
    pub fn signature(&self, name: &str) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                let opt = if a.required { "" } else { "?" };
                format!("{}{}: {}", a.canonical(), opt, a.arg_type.name())
            })
            .collect();
        format!("{}({})", name, args.join(", "))
    }

    /// Validate the call site and run the native body. Steps: classify the
    /// call as named or positional, check required/unknown/duplicate/arity,
    /// evaluate each declared argument in declaration order (substituting
    /// defaults), type-check, then invoke.
    pub fn invoke(
        &self,
        name: &str,
        ctx: &InvocationCtx<'_>,
        args: &[CallArg],
    ) -> FramescriptResult<Value> {
        let named = matches!(args.first(), Some(CallArg::Named { .. }));
        let err = |message: String| {
            FramescriptError::function_argument(name, message, self.signature(name))
        };

        if named {
            let mut seen: Vec<&str> = Vec::new();
            let mut unknown: Vec<&str> = Vec::new();
            for arg in args {
                let CallArg::Named { name: arg_name, .. } = arg else {
                    return Err(err("cannot mix named and positional arguments".to_string()));
                };
                if seen.contains(&arg_name.as_str()) {
                    return Err(err(format!("duplicate argument '{arg_name}'")));
                }
                seen.push(arg_name.as_str());
                if !self.args.iter().any(|d| d.accepts(arg_name)) {
                    unknown.push(arg_name.as_str());
                }
            }
            if !unknown.is_empty() {
                return Err(err(format!(
                    "unrecognized argument(s): {}",
                    unknown.join(", ")
                )));
            }
            // Two aliases of the same argument also count as a duplicate.
            for def in self.args {
                let hits: Vec<&str> = seen
                    .iter()
                    .copied()
                    .filter(|n| def.accepts(n))
                    .collect();
                if hits.len() > 1 {
                    return Err(err(format!("duplicate argument '{}'", hits[1])));
                }
            }
        } else {
            if args.len() > self.args.len() {
                return Err(err(format!(
                    "too many arguments: expected at most {}, got {}",
                    self.args.len(),
                    args.len()
                )));
            }
            if args.iter().any(|a| matches!(a, CallArg::Named { .. })) {
                return Err(err("cannot mix named and positional arguments".to_string()));
            }
        }

        let missing: Vec<&str> = self
            .args
            .iter()
            .enumerate()
            .filter(|(i, def)| {
                def.required
                    && if named {
                        !args.iter().any(|a| {
                            matches!(a, CallArg::Named { name, .. } if def.accepts(name))
                        })
                    } else {
                        *i >= args.len()
                    }
            })
            .map(|(_, def)| def.canonical())
            .collect();
        if !missing.is_empty() {
            return Err(err(format!(
                "missing required argument(s): {}",
                missing.join(", ")
            )));
        }

        let mut values = Vec::with_capacity(self.args.len());
        for (i, def) in self.args.iter().enumerate() {
            let supplied = if named {
                args.iter().find(|a| {
                    matches!(a, CallArg::Named { name, .. } if def.accepts(name))
                })
            } else {
                args.get(i)
            };
            let value = match supplied {
                Some(arg) => arg.value().invoke(ctx)?,
                None => match def.default {
                    Some(d) => d.resolve(ctx),
                    None => {
                        // required-but-missing was caught above
                        return Err(err(format!(
                            "missing required argument(s): {}",
                            def.canonical()
                        )));
                    }
                },
            };
            if !def.arg_type.matches(&value) {
                return Err(err(format!(
                    "argument '{}' expects a {}",
                    def.canonical(),
                    def.arg_type.name()
                )));
            }
            values.push(value);
        }

        (self.call)(ctx, &values)
    }
}

/// Immutable registry of callable library functions, built once and passed
/// into parser and evaluator construction.
pub struct FunctionLibrary {
    map: BTreeMap<&'static str, FunctionSpec>,
}

impl FunctionLibrary {
    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.map.keys().copied()
    }

    pub fn standard() -> Self {
        let mut map = BTreeMap::new();

        const AB: &[ArgDef] = &[
            ArgDef {
                names: &["a"],
                arg_type: ArgType::Number,
                required: true,
                default: None,
            },
            ArgDef {
                names: &["b"],
                arg_type: ArgType::Number,
                required: true,
                default: None,
            },
        ];
        map.insert(
            "min",
            FunctionSpec {
                description: "Smaller of two numbers.",
                args: AB,
                call: |_ctx, v| Ok(Value::Number(v[0].as_number().min(v[1].as_number()))),
            },
        );
        map.insert(
            "max",
            FunctionSpec {
                description: "Larger of two numbers.",
                args: AB,
                call: |_ctx, v| Ok(Value::Number(v[0].as_number().max(v[1].as_number()))),
            },
        );

        // Oscillators share one argument shape: period (required), phase,
        // amplitude, centre, pulse width.
        const OSC: &[ArgDef] = &[
            ArgDef {
                names: &["period", "p"],
                arg_type: ArgType::Number,
                required: true,
                default: None,
            },
            ArgDef {
                names: &["phase", "ps"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(0.0)),
            },
            ArgDef {
                names: &["amp", "a"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(1.0)),
            },
            ArgDef {
                names: &["centre", "c"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(0.0)),
            },
            ArgDef {
                names: &["pulse", "pw"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(5.0)),
            },
        ];

        fn osc_pos(ctx: &InvocationCtx<'_>, v: &[Value]) -> (f64, f64, f64, f64, f64, f64) {
            let period = v[0].as_number();
            let phase = v[1].as_number();
            let amp = v[2].as_number();
            let centre = v[3].as_number();
            let pw = v[4].as_number();
            let pos = ctx.frame as f64 + phase;
            (period, phase, amp, centre, pw, pos)
        }

        map.insert(
            "sin",
            FunctionSpec {
                description: "Sine wave over the frame timeline.",
                args: OSC,
                call: |ctx, v| {
                    let (period, _, amp, centre, _, pos) = osc_pos(ctx, v);
                    Ok(Value::Number(centre + amp * (TAU * pos / period).sin()))
                },
            },
        );
        map.insert(
            "sq",
            FunctionSpec {
                description: "Square wave over the frame timeline.",
                args: OSC,
                call: |ctx, v| {
                    let (period, _, amp, centre, _, pos) = osc_pos(ctx, v);
                    let s = (TAU * pos / period).sin();
                    Ok(Value::Number(centre + amp * if s >= 0.0 { 1.0 } else { -1.0 }))
                },
            },
        );
        map.insert(
            "saw",
            FunctionSpec {
                description: "Sawtooth wave over the frame timeline.",
                args: OSC,
                call: |ctx, v| {
                    let (period, _, amp, centre, _, pos) = osc_pos(ctx, v);
                    let frac = (pos.rem_euclid(period)) / period;
                    Ok(Value::Number(centre + amp * (2.0 * frac - 1.0)))
                },
            },
        );
        map.insert(
            "tri",
            FunctionSpec {
                description: "Triangle wave over the frame timeline.",
                args: OSC,
                call: |ctx, v| {
                    let (period, _, amp, centre, _, pos) = osc_pos(ctx, v);
                    let frac = (pos.rem_euclid(period)) / period;
                    Ok(Value::Number(
                        centre + amp * (1.0 - 4.0 * (frac - 0.5).abs()),
                    ))
                },
            },
        );
        map.insert(
            "pulse",
            FunctionSpec {
                description: "Pulse wave: amplitude for the first `pulse` frames of each period.",
                args: OSC,
                call: |ctx, v| {
                    let (period, _, amp, centre, pw, pos) = osc_pos(ctx, v);
                    let within = pos.rem_euclid(period);
                    Ok(Value::Number(centre + if within < pw { amp } else { 0.0 }))
                },
            },
        );

        const BEZ: &[ArgDef] = &[
            ArgDef {
                names: &["x1"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(0.5)),
            },
            ArgDef {
                names: &["y1"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(0.0)),
            },
            ArgDef {
                names: &["x2"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(0.5)),
            },
            ArgDef {
                names: &["y2"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(1.0)),
            },
        ];
        map.insert(
            "bez",
            FunctionSpec {
                description: "Cubic-bezier ease between the active and next keyframe values.",
                args: BEZ,
                call: |ctx, v| {
                    let from = ctx.active_keyframe_value();
                    let to = ctx.next_keyframe_value();
                    let span = (ctx.next_keyframe() - ctx.active_keyframe) as f64;
                    if span <= 0.0 {
                        return Ok(Value::Number(from));
                    }
                    let progress =
                        ((ctx.frame - ctx.active_keyframe) as f64 / span).clamp(0.0, 1.0);
                    let eased = cubic_bezier_y(
                        v[0].as_number(),
                        v[1].as_number(),
                        v[2].as_number(),
                        v[3].as_number(),
                        progress,
                    );
                    Ok(Value::Number(from + (to - from) * eased))
                },
            },
        );

        const SLIDE: &[ArgDef] = &[
            ArgDef {
                names: &["from"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::ActiveKeyframeValue),
            },
            ArgDef {
                names: &["to"],
                arg_type: ArgType::Number,
                required: true,
                default: None,
            },
            ArgDef {
                names: &["in"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::FramesToNextKeyframe),
            },
        ];
        map.insert(
            "slide",
            FunctionSpec {
                description: "Linear ramp from one value to another starting at the active keyframe.",
                args: SLIDE,
                call: |ctx, v| {
                    let from = v[0].as_number();
                    let to = v[1].as_number();
                    let over = v[2].as_number();
                    if over <= 0.0 {
                        return Ok(Value::Number(to));
                    }
                    let progress =
                        ((ctx.frame - ctx.active_keyframe) as f64 / over).clamp(0.0, 1.0);
                    Ok(Value::Number(from + (to - from) * progress))
                },
            },
        );

        const RAND: &[ArgDef] = &[
            ArgDef {
                names: &["min", "n"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(0.0)),
            },
            ArgDef {
                names: &["max", "x"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(1.0)),
            },
            ArgDef {
                names: &["seed", "s"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::FrameSeed),
            },
        ];
        map.insert(
            "rand",
            FunctionSpec {
                description: "Deterministic per-frame pseudo-random number in [min, max).",
                args: RAND,
                call: |ctx, v| {
                    let lo = v[0].as_number();
                    let hi = v[1].as_number();
                    let seed = v[2].as_number();
                    let h = mix64(seed.to_bits() ^ (ctx.frame as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                    let unit = (h >> 11) as f64 / (1u64 << 53) as f64;
                    Ok(Value::Number(lo + unit * (hi - lo)))
                },
            },
        );

        const ROUNDING: &[ArgDef] = &[
            ArgDef {
                names: &["v"],
                arg_type: ArgType::Number,
                required: true,
                default: None,
            },
            ArgDef {
                names: &["p"],
                arg_type: ArgType::Number,
                required: false,
                default: Some(ArgDefault::Number(0.0)),
            },
        ];
        map.insert(
            "round",
            FunctionSpec {
                description: "Round to `p` decimal places.",
                args: ROUNDING,
                call: |_ctx, v| Ok(Value::Number(scale_op(v, f64::round))),
            },
        );
        map.insert(
            "ceil",
            FunctionSpec {
                description: "Round up to `p` decimal places.",
                args: ROUNDING,
                call: |_ctx, v| Ok(Value::Number(scale_op(v, f64::ceil))),
            },
        );
        map.insert(
            "floor",
            FunctionSpec {
                description: "Round down to `p` decimal places.",
                args: ROUNDING,
                call: |_ctx, v| Ok(Value::Number(scale_op(v, f64::floor))),
            },
        );

        Self { map }
    }
}

fn scale_op(v: &[Value], op: fn(f64) -> f64) -> f64 {
    let value = v[0].as_number();
    let places = v[1].as_number();
    let scale = 10f64.powf(places);
    op(value * scale) / scale
}

// SplitMix64 mixing function.
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Solve y for the x=progress point of the cubic bezier through (0,0),
/// (x1,y1), (x2,y2), (1,1). Bisection is plenty at per-frame resolution.
fn cubic_bezier_y(x1: f64, y1: f64, x2: f64, y2: f64, progress: f64) -> f64 {
    fn coord(a: f64, b: f64, t: f64) -> f64 {
        let u = 1.0 - t;
        3.0 * u * u * t * a + 3.0 * u * t * t * b + t * t * t
    }

    let (mut lo, mut hi) = (0.0f64, 1.0f64);
    let mut t = progress;
    for _ in 0..40 {
        let x = coord(x1, x2, t);
        if (x - progress).abs() < 1e-7 {
            break;
        }
        if x < progress {
            lo = t;
        } else {
            hi = t;
        }
        t = (lo + hi) / 2.0;
    }
    coord(y1, y2, t)
}
