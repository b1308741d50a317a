pub mod backend;
pub mod backend_clients;
pub mod config;
pub mod criteria;
pub mod editor;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod pagination;
pub mod search;
pub mod selection;
pub mod stats;
pub mod store;
pub mod validation;
pub mod view;
pub mod web_server;
