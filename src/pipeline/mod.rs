//! Pipeline stages for paper digestion.
//!
//! Each submodule implements one transformation step. Stages take what they
//! need from the [`PipelineState`](crate::state::PipelineState) by reference
//! and return what they produce; only the driver in [`crate::run`] writes to
//! the state.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ layout ──▶ extract ──┬──▶ sections ──▶ text ──▶ summary ──▶ translate (summaries)
//! (check)  (pdfium)  (Upstage)   (JSON)    │
//!                                          └──▶ crop ──▶ media ──▶ assemble (original) ──▶ translate (document)
//!                                                                        │
//!                                                                        ▼
//!                                                                   assemble (4 docs)
//! ```
//!
//! 1. [`input`]: reject anything that is not a readable PDF
//! 2. [`split`]: write page batches as standalone PDFs
//! 3. [`layout`]: one layout-analysis call per batch; the only stage
//!    talking to the layout service
//! 4. [`extract`]: page metadata, typed elements and the ordered HTML sequence
//! 5. [`sections`]: name every page after its nearest preceding heading
//! 6. [`crop`]: cut figures, tables and equations out of page renderings
//! 7. [`text`]: per-page and whole-document plain text
//! 8. [`summary`]: map-reduce summarization
//! 9. [`translate`]: summary and full-document translation
//! 10. [`media`]: captions for every cropped asset
//! 11. [`assemble`]: the four markdown documents, pure over the state
//!
//! Supporting modules: [`render`] (pdfium, `spawn_blocking`), [`encode`]
//! (asset → base64 image), [`llm`] (generative transform seam),
//! [`markdown`] (HTML fragment → markdown) and [`postprocess`] (cleanup
//! rules).

pub mod assemble;
pub mod crop;
pub mod encode;
pub mod extract;
pub mod input;
pub mod layout;
pub mod llm;
pub mod markdown;
pub mod media;
pub mod postprocess;
pub mod render;
pub mod sections;
pub mod split;
pub mod summary;
pub mod text;
pub mod translate;
