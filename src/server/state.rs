use std::sync::Arc;
use std::time::Instant;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::dispatch::DeliveryEngine;
use crate::template::TemplateStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub engine: Arc<DeliveryEngine>,
    pub template_store: Arc<TemplateStore>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        engine: Arc<DeliveryEngine>,
        template_store: Arc<TemplateStore>,
    ) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            engine,
            template_store,
            start_time: Instant::now(),
        }
    }
}
