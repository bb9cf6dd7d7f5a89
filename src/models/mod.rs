//! # Models
//!
//! Count models for RNA-seq differential expression. The negative-binomial
//! clustering model lives in [`nbinom`].

pub mod nbinom;
