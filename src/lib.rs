pub mod config;
pub mod crypt;
pub mod fs_util;
pub mod grammars;
pub mod identity;
pub mod runtime_tree;
pub mod slapd;
pub mod supervisor;
