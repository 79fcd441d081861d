//! Service layer: provider clients, webhook handling and the scan pipeline

pub mod analysis_client;
pub mod billing_client;
pub mod image_store;
pub mod scan_pipeline;
pub mod subscription_dispatcher;
pub mod suggestion_client;
pub mod webhook_verifier;

pub use analysis_client::{AnalysisError, FaceAnalyzer, ReplicateClient};
pub use billing_client::{
    BillingError, BillingProvider, BillingSubscription, CheckoutSession, StripeClient,
};
pub use image_store::{ImageStore, StorageError, SupabaseStorage};
pub use scan_pipeline::{ScanError, ScanPipeline};
pub use subscription_dispatcher::{
    BillingEventKind, DispatchError, DispatchOutcome, SubscriptionDispatcher,
};
pub use suggestion_client::{GenerationError, OpenAiClient, SuggestionGenerator};
pub use webhook_verifier::{BillingEvent, SignatureError, WebhookVerifier};
