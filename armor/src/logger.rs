use chrono::Local;
use std::cell::RefCell;
use std::fmt;

thread_local! {
    static TENANT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Tags every line logged on the current thread with a tenant until dropped.
pub struct TenantScope {
    previous: Option<String>,
}

impl Drop for TenantScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        TENANT.with(|t| *t.borrow_mut() = previous);
    }
}

pub fn tenant_scope(tenant: &str) -> TenantScope {
    let previous = TENANT.with(|t| t.borrow_mut().replace(tenant.to_string()));
    TenantScope { previous }
}

pub fn current_tenant() -> Option<String> {
    TENANT.with(|t| t.borrow().clone())
}

fn line(level: &str, args: fmt::Arguments) -> String {
    let now = Local::now();
    match current_tenant() {
        Some(tenant) => format!("[{}] {} [tenant={}] {}", now.format("%Y-%m-%d %H:%M:%S"), level, tenant, args),
        None => format!("[{}] {} {}", now.format("%Y-%m-%d %H:%M:%S"), level, args),
    }
}

pub fn info(args: fmt::Arguments) {
    println!("{}", line("INFO", args));
}

pub fn warn(args: fmt::Arguments) {
    println!("{}", line("WARN", args));
}

pub fn error(args: fmt::Arguments) {
    eprintln!("{}", line("ERROR", args));
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::logger::info(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::logger::warn(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::logger::error(format_args!($($arg)*))
    };
}
