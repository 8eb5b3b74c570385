/// Builds a [`Metadata`](crate::logger::Metadata) map from `key => value` pairs.
/// Values go through `serde_json::json!`, so anything serializable works.
#[macro_export]
macro_rules! metadata {
    () => {
        $crate::logger::Metadata::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::logger::Metadata::new();
        $(
            fields.insert(::std::string::String::from($key), $crate::serde_json::json!($value));
        )+
        fields
    }};
}

#[macro_export]
macro_rules! log_at {
    ($logger:expr, $level:expr, $msg:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $logger.emit($level, $msg, $crate::metadata!($($key => $value),*))
    };
}

#[macro_export]
macro_rules! log_trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logger::LogLevel::Trace, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logger::LogLevel::Debug, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_notice {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logger::LogLevel::Notice, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logger::LogLevel::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_success {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logger::LogLevel::Success, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logger::LogLevel::Warn, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logger::LogLevel::Error, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_fatal {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $crate::logger::LogLevel::Fatal, $($arg)+)
    };
}
