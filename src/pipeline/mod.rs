pub mod extraction;
pub mod nutrition;
pub mod weight;
pub mod recommendation;
pub mod orchestrator; // Quality → OCR → parse → recommend state machine
