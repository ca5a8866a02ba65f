//! Tokenized command with a secret mask

use std::fmt;

use crate::error::MaskError;
use crate::quote::posix_quote;

/// Marker substituted for masked tokens in any displayed or streamed text
pub const MASK: &str = "****";

/// An ordered command line `[program, ...args]` with a parallel secret mask
///
/// Built once per launch and never mutated. `Debug` and `Display` both render
/// the masked form, so the raw tokens only leave through [`Self::tokens`].
#[derive(Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    tokens: Vec<String>,
    masks: Vec<bool>,
}

impl CommandInvocation {
    /// Create an invocation from tokens and a same-length mask
    ///
    /// # Errors
    /// Returns `MaskError::LengthMismatch` if the vectors differ in length
    pub fn new(tokens: Vec<String>, masks: Vec<bool>) -> Result<Self, MaskError> {
        if tokens.len() != masks.len() {
            return Err(MaskError::LengthMismatch {
                tokens: tokens.len(),
                masks: masks.len(),
            });
        }
        Ok(Self { tokens, masks })
    }

    /// Create an invocation with no secret positions
    #[must_use]
    pub fn unmasked(tokens: Vec<String>) -> Self {
        let masks = vec![false; tokens.len()];
        Self { tokens, masks }
    }

    /// All tokens, secrets included
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Mask vector, same length as [`Self::tokens`]
    #[must_use]
    pub fn masks(&self) -> &[bool] {
        &self.masks
    }

    /// Program to execute (first token)
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    /// Arguments after the program
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or_default()
    }

    /// Literal values at masked positions
    pub fn secrets(&self) -> impl Iterator<Item = &str> {
        self.tokens
            .iter()
            .zip(&self.masks)
            .filter(|(_, masked)| **masked)
            .map(|(token, _)| token.as_str())
    }

    /// Whether any position is masked
    #[must_use]
    pub fn has_secrets(&self) -> bool {
        self.masks.iter().any(|m| *m)
    }

    /// Render the command for logs, masked positions replaced by [`MASK`]
    #[must_use]
    pub fn masked_display(&self) -> String {
        self.tokens
            .iter()
            .zip(&self.masks)
            .map(|(token, masked)| {
                if *masked {
                    MASK.to_string()
                } else {
                    posix_quote(token)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandInvocation")
            .field(&self.masked_display())
            .finish()
    }
}

impl fmt::Display for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked_display())
    }
}
