//! ---
//! aso_section: "03-logging"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Structured logging adapters for telemetry events."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---

#[doc(hidden)]
#[macro_export]
macro_rules! __aso_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            status = ctx.status.unwrap_or(""),
            subscriber = ctx.subscriber.unwrap_or_default(),
            tick = ctx.tick.unwrap_or_default(),
            origin = ctx.origin.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with telemetry context.
#[macro_export]
macro_rules! aso_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__aso_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__aso_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with telemetry context.
#[macro_export]
macro_rules! aso_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__aso_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__aso_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with telemetry context.
#[macro_export]
macro_rules! aso_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__aso_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__aso_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}
