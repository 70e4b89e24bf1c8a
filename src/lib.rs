#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod backend;
pub mod cli;
pub mod cloudinit;
pub mod commands;
pub mod config;
pub mod domain_xml;
pub mod error;
pub mod external;
pub mod listing;
pub mod naming;
pub mod osinfo;
pub mod paths;
pub mod pool_xml;
pub mod template;
pub mod util;
pub mod vm_state;
