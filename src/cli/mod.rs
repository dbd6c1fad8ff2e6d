pub mod app;
mod commands;
mod context;
mod dispatch;
mod env;
mod info;
mod reduce;
mod runtime;
mod serve;
