pub mod checklist;
pub mod intake;
