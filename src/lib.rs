pub mod aws_clients;
pub mod captcha;
pub mod config;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod listing;
pub mod memory;
pub mod models;
pub mod outcome;
pub mod repositories;
pub mod request;
pub mod routes;
pub mod startup;
pub mod storage;
pub mod submission;
pub mod voting;

use crate::{
    config::EnvironmentFlags,
    domain::{Clock, FileStorage, MemeRepository, VoteRepository},
};
use std::sync::Arc;

/// AppState holds shared resources for the web server.
#[derive(Clone)]
pub struct AppState {
    pub meme_repo: Arc<dyn MemeRepository>,
    pub vote_repo: Arc<dyn VoteRepository>,
    pub file_storage: Arc<dyn FileStorage>,
    pub clock: Arc<dyn Clock>,
    pub environment: EnvironmentFlags,
}
