mod binder;
mod config;
mod lock;
mod operator;
