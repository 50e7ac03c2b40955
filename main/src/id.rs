use mockall::automock;
use pva_discovery_protocol::Guid;
use thiserror::Error;

#[automock]
pub trait GuidGenerator: Send + Sync {
    fn generate(&self) -> Result<Guid, GuidError>;
}

/// Draws server identities from the operating system's random source.
pub struct RandomGuidGenerator;

impl GuidGenerator for RandomGuidGenerator {
    fn generate(&self) -> Result<Guid, GuidError> {
        let mut guid = Guid::default();
        getrandom::fill(&mut guid.0)?;
        Ok(guid)
    }
}

#[derive(Error, Debug)]
#[error("Failed to read from the random source")]
pub struct GuidError(#[from] getrandom::Error);
