/*!
 * Prompt construction.
 *
 * - `base`: task framing and the first-pass prompt
 * - `enhancer`: the maximally strict repair prompt
 */

pub mod base;
pub mod enhancer;

pub use base::{first_pass_prompt, task_framing};
pub use enhancer::PromptEnhancer;
