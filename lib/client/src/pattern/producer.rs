use crate::pattern::instantiate;
use crate::profile::{OperationTemplate, ProfileError};
use crate::SepaClient;
use sepa_model::{Bindings, ErrorResponse, Response};
use std::sync::Arc;
use tracing::warn;

/// Publishes one named update of the profile.
#[derive(Debug)]
pub struct Producer {
    client: Arc<SepaClient>,
    update_id: String,
    template: OperationTemplate,
}

impl Producer {
    pub fn new(client: Arc<SepaClient>, update_id: &str) -> Result<Self, ProfileError> {
        let template = client
            .profile()
            .update(update_id)
            .cloned()
            .ok_or_else(|| ProfileError::UnknownUpdate(update_id.to_owned()))?;
        Ok(Self {
            client,
            update_id: update_id.to_owned(),
            template,
        })
    }

    pub fn update_id(&self) -> &str {
        &self.update_id
    }

    pub fn template(&self) -> &OperationTemplate {
        &self.template
    }

    /// The update text with `forced` substituted.
    pub fn sparql(&self, forced: &Bindings) -> Result<String, ProfileError> {
        instantiate(self.client.profile(), &self.template, forced)
    }

    /// Fails with `InvalidRequest`, without contacting the broker, if a value is not a valid term.
    pub async fn update(&self, forced: &Bindings) -> Response {
        match self.sparql(forced) {
            Ok(sparql) => self.client.update(sparql).await,
            Err(e) => ErrorResponse::invalid_request(format!("{}: {e}", self.update_id)).into(),
        }
    }

    /// Like [`Producer::update`], reduced to whether the broker accepted the update.
    pub async fn publish(&self, forced: &Bindings) -> bool {
        match self.update(forced).await {
            Response::Update(_) => true,
            Response::Error(e) => {
                warn!("{} failed: {e}", self.update_id);
                false
            }
            _ => false,
        }
    }
}
