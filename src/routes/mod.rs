pub mod matches;
pub mod model;

use actix_web::web;
use std::sync::Arc;

use crate::config::{MatchingSettings, ModelSettings};
use crate::core::Matcher;
use crate::services::Registry;

/// Application state shared across all handlers
pub struct AppState<R> {
    pub registry: Arc<R>,
    pub matcher: Matcher,
    pub matching: MatchingSettings,
    pub model: ModelSettings,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            matcher: self.matcher.clone(),
            matching: self.matching.clone(),
            model: self.model.clone(),
        }
    }
}

pub fn configure_routes<R: Registry + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(matches::configure::<R>)
            .configure(model::configure::<R>),
    );
}
