pub mod booking;
pub mod checkout;
pub mod config;
pub mod contact;
pub mod db;
pub mod error;
pub mod http;
pub mod listings;
pub mod model;
pub mod review;
pub mod webhook;
