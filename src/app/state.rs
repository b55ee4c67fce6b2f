use super::{Component, ComponentState, ScanApp};
use tracing::{debug, warn};

impl ScanApp {
    pub async fn set_component_state(&self, component: Component, state: ComponentState) {
        let previous = self.component_states.lock().await.insert(component, state);
        match state {
            ComponentState::Failed => warn!("Component '{}' failed", component),
            _ => debug!(
                "Component '{}' state changed: {:?} -> {:?}",
                component, previous, state
            ),
        }
    }

    pub async fn get_component_state(&self, component: Component) -> Option<ComponentState> {
        self.component_states.lock().await.get(&component).copied()
    }

    /// Registered components and their states, in startup order
    pub async fn component_states(&self) -> Vec<(Component, ComponentState)> {
        self.component_states
            .lock()
            .await
            .iter()
            .map(|(component, state)| (*component, *state))
            .collect()
    }

    /// Components that failed to start; the session runs degraded without them
    pub async fn failed_components(&self) -> Vec<Component> {
        self.component_states
            .lock()
            .await
            .iter()
            .filter(|(_, state)| **state == ComponentState::Failed)
            .map(|(component, _)| *component)
            .collect()
    }
}
