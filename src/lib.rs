// src/lib.rs
//
// O binário e os testes de integração compartilham estes módulos.

pub mod common;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod services;
