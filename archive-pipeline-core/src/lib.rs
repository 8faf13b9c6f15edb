#![doc = "archive-pipeline-core: core logic library for archive-pipeline."]

//! This crate contains the orchestration that turns a root text and its
//! translations or commentaries into aligned archive records, together with
//! the collaborator contracts it drives.
//!
//! # Usage
//! The CLI crate wires concrete collaborators (command-backed parser and
//! serializer, asset publisher, HTTP uploader) into [`pipeline::Pipeline`].

pub mod contract;
pub mod error;
pub mod parse;
pub mod pipeline;
pub mod publish;
pub mod retry;
pub mod serialize;
pub mod tool;
