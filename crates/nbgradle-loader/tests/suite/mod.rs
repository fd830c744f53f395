mod context;
mod support;
