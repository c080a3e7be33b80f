// ==============================================================================
// lib.rs - SNP Annotation Engine Library
// ==============================================================================
// Description: Library interface for the annotation engine modules
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

pub mod parsers;
pub mod audit;
pub mod validator;
pub mod genotype;
pub mod models;
pub mod reference_index;
pub mod matcher;
pub mod scoring;
pub mod scheduler;
pub mod session;
pub mod config;
pub mod output;
