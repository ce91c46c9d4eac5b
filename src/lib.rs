// File: lib.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]

pub mod batch;
pub mod cli;
pub mod config;
pub mod detector;
pub mod errors;
pub mod getstate;
pub mod http;
pub mod persistence;
pub mod report;
pub mod response;
pub mod scanner;

#[cfg(test)]
mod test_support;
