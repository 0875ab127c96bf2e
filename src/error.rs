use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Type error: {0}")]
    Type(String),
    #[error("Could not import module \"{0}\" at runtime")]
    UnresolvedModule(String),
    #[error("{0}() not implemented")]
    Unimplemented(String),
    #[error("Value {0} is not callable")]
    NotCallable(String),
    #[error("I/O error: {0}")]
    Io(String),
}

pub type RtResult<T> = Result<T, RuntimeError>;

impl RuntimeError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        RuntimeError::Type(msg.into())
    }

    pub fn unimplemented(name: &str) -> Self {
        RuntimeError::Unimplemented(name.to_string())
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(value: std::io::Error) -> Self {
        RuntimeError::Io(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_item() {
        let err = RuntimeError::UnresolvedModule("missing".to_string());
        assert_eq!(err.to_string(), "Could not import module \"missing\" at runtime");

        let err = RuntimeError::unimplemented("exec");
        assert_eq!(err.to_string(), "exec() not implemented");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: RuntimeError = io.into();
        assert!(matches!(err, RuntimeError::Io(ref msg) if msg.contains("pipe closed")));
    }
}
