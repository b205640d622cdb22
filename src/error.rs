pub type FramescriptResult<T> = Result<T, FramescriptError>;

#[derive(thiserror::Error, Debug)]
pub enum FramescriptError {
    #[error("lex error at line {line}, column {column}: {message}")]
    Lex {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("invalid arguments to '{function}': {message} (signature: {signature})")]
    FunctionArgument {
        function: String,
        message: String,
        signature: String,
    },

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("render error on field '{field}' at frame {frame} in formula '{formula}': {source}")]
    Formula {
        field: String,
        frame: i64,
        formula: String,
        source: Box<FramescriptError>,
    },

    #[error("render error: {0}")]
    Render(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramescriptError {
    pub fn lex(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Lex {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn parse(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn function_argument(
        function: impl Into<String>,
        message: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self::FunctionArgument {
            function: function.into(),
            message: message.into(),
            signature: signature.into(),
        }
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn for_field(self, field: impl Into<String>, frame: i64, formula: impl Into<String>) -> Self {
        Self::Formula {
            field: field.into(),
            frame,
            formula: formula.into(),
            source: Box::new(self),
        }
    }
}
