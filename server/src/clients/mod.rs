//! External-service HTTP clients (C5, C6, C7, C12's reranker/generation
//! call). Each is a thin `reqwest` wrapper matching the contract in
//! spec §4.4-4.6/§4.12, grounded on the corresponding
//! `original_source/backend/app/services/*.py` module.

pub mod embedding;
pub mod lexical;
pub mod llm;
pub mod vector;
