#![forbid(unsafe_code)]

pub mod ast;
pub mod decimate;
pub mod error;
pub mod functions;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod prompt;
pub mod render;

pub use ast::{Ast, BinaryOperator, CallArg, InvocationCtx, Value};
pub use error::{FramescriptError, FramescriptResult};
pub use functions::{ArgDef, ArgType, FunctionLibrary, FunctionSpec};
pub use model::{
    Document, FieldMeta, Keyframe, PromptSpec, RenderOptions, RenderedData, RenderedFrame,
    SparkPoint,
};
pub use parser::parse;
pub use render::Renderer;
