// ── Device operations seam ──
//
// Agent B and the supervisor's cold-start sweep reach the simulator
// through this trait so tests can script a fake device instead of
// standing up HTTP.

use async_trait::async_trait;

use cellgrid_api::{
    AntennaPort, ApiError, FleetSnapshot, PowerTarget, SwitchState, TowerClient,
};

#[async_trait]
pub trait TowerDevice: Send + Sync {
    /// Fetch the current fleet snapshot.
    async fn fetch_state(&self) -> Result<FleetSnapshot, ApiError>;

    /// Switch mains power for one site or the whole fleet.
    async fn power(&self, target: PowerTarget, state: SwitchState) -> Result<(), ApiError>;

    /// Switch one antenna's radio head.
    async fn rru(
        &self,
        site: &str,
        antenna: AntennaPort,
        state: SwitchState,
    ) -> Result<(), ApiError>;
}

#[async_trait]
impl TowerDevice for TowerClient {
    async fn fetch_state(&self) -> Result<FleetSnapshot, ApiError> {
        self.get_state().await
    }

    async fn power(&self, target: PowerTarget, state: SwitchState) -> Result<(), ApiError> {
        self.set_power(&target, state).await
    }

    async fn rru(
        &self,
        site: &str,
        antenna: AntennaPort,
        state: SwitchState,
    ) -> Result<(), ApiError> {
        self.set_rru(site, antenna, state).await
    }
}
