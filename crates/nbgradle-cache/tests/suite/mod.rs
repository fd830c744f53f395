mod memory_cache;
mod persistent_cache;
mod support;
