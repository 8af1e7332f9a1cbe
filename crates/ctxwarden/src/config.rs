//! Budget and compaction configuration.
//!
//! [`BudgetConfig`] is an immutable value object describing one interactive
//! budget: capacity, health thresholds, reduction targets, and the scoring
//! knobs used by the eviction strategies. It can only be obtained from
//! [`BudgetConfigBuilder::build`], which rejects malformed values eagerly so
//! evaluation never has to.
//!
//! [`CompactionConfig`] holds the session-level handoff settings used by the
//! [`CompactionCoordinator`](crate::context::CompactionCoordinator).
//!
//! # Examples
//!
//! ```
//! use ctxwarden::config::{BudgetConfig, BudgetProfile};
//!
//! let config = BudgetConfig::builder(8_000)
//!     .with_thresholds(0.6, 0.75, 0.9)
//!     .with_target_ratio(0.5)
//!     .with_profile(BudgetProfile::SubTask)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.target_tokens(), 4_000);
//! assert_eq!(config.role_weights().system, 7.0);
//! ```

use crate::MessageRole;
use crate::context::critical::CriticalPatterns;
use crate::context::summarizer::DEFAULT_SUMMARY_INSTRUCTIONS;
use crate::error::ConfigError;
use std::time::Duration;

pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.70;
pub const DEFAULT_PRUNE_THRESHOLD: f64 = 0.80;
pub const DEFAULT_EMERGENCY_THRESHOLD: f64 = 0.95;

/// Fraction of capacity a reduction aims for.
pub const DEFAULT_TARGET_RATIO: f64 = 0.60;

/// Largest share of the current tokens one reduction may remove.
pub const DEFAULT_MAX_COMPACTION_RATIO: f64 = 0.75;

/// Role/formatting tax added to every message.
pub const DEFAULT_PER_MESSAGE_OVERHEAD: usize = 4;

pub const DEFAULT_RECENCY_WEIGHT: f64 = 5.0;
pub const DEFAULT_LENGTH_PENALTY: f64 = 2.0;
pub const DEFAULT_LENGTH_THRESHOLD: usize = 2000;
pub const DEFAULT_CRITICAL_BONUS: f64 = 3.0;

/// Non-system messages the temporal strategy always keeps.
pub const DEFAULT_TEMPORAL_FLOOR: usize = 5;

/// Characters of normalized content used as a dedup fingerprint.
pub const DEFAULT_FINGERPRINT_LEN: usize = 100;

/// Messages kept verbatim at the end of a compacted handoff.
pub const DEFAULT_RECENT_TAIL: usize = 5;

/// Critical messages copied next to the summary in a compacted handoff.
pub const DEFAULT_CRITICAL_KEEP: usize = 3;

pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(60);

// ── Role weights ───────────────────────────────────────────────────

/// Which kind of budget a configuration describes. Only the system role
/// weight differs between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BudgetProfile {
    /// The main interactive conversation.
    #[default]
    Interactive,
    /// A delegated sub-task working from a handoff.
    SubTask,
}

impl BudgetProfile {
    pub fn system_weight(self) -> f64 {
        match self {
            BudgetProfile::Interactive => 10.0,
            BudgetProfile::SubTask => 7.0,
        }
    }
}

/// Base score per role used by the priority scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoleWeights {
    pub system: f64,
    pub user: f64,
    pub assistant: f64,
    /// Weight for every other role.
    pub other: f64,
}

impl RoleWeights {
    pub fn for_profile(profile: BudgetProfile) -> Self {
        Self {
            system: profile.system_weight(),
            user: 6.0,
            assistant: 5.0,
            other: 3.0,
        }
    }

    pub fn weight(&self, role: MessageRole) -> f64 {
        match role {
            MessageRole::System => self.system,
            MessageRole::User => self.user,
            MessageRole::Assistant => self.assistant,
            MessageRole::Tool => self.other,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_weight("role_weights.system", self.system)?;
        check_weight("role_weights.user", self.user)?;
        check_weight("role_weights.assistant", self.assistant)?;
        check_weight("role_weights.other", self.other)
    }
}

impl Default for RoleWeights {
    fn default() -> Self {
        Self::for_profile(BudgetProfile::Interactive)
    }
}

// ── BudgetConfig ───────────────────────────────────────────────────

/// Validated configuration for one interactive token budget.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    capacity: usize,
    warning_threshold: f64,
    prune_threshold: f64,
    emergency_threshold: f64,
    target_ratio: f64,
    batch_size: usize,
    max_compaction_ratio: f64,
    per_message_overhead: usize,
    role_weights: RoleWeights,
    recency_weight: f64,
    length_penalty: f64,
    length_threshold: usize,
    critical_bonus: f64,
    decay_rate: f64,
    temporal_floor: usize,
    fingerprint_len: usize,
    allow_hard_cutoff: bool,
    critical_patterns: CriticalPatterns,
}

impl BudgetConfig {
    /// Start building a configuration for a budget of `capacity` tokens.
    pub fn builder(capacity: usize) -> BudgetConfigBuilder {
        BudgetConfigBuilder::new(capacity)
    }

    /// Token ceiling the health percentage is computed against.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn warning_threshold(&self) -> f64 {
        self.warning_threshold
    }

    pub fn prune_threshold(&self) -> f64 {
        self.prune_threshold
    }

    pub fn emergency_threshold(&self) -> f64 {
        self.emergency_threshold
    }

    pub fn target_ratio(&self) -> f64 {
        self.target_ratio
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_compaction_ratio(&self) -> f64 {
        self.max_compaction_ratio
    }

    pub fn per_message_overhead(&self) -> usize {
        self.per_message_overhead
    }

    pub fn role_weights(&self) -> &RoleWeights {
        &self.role_weights
    }

    pub fn recency_weight(&self) -> f64 {
        self.recency_weight
    }

    pub fn length_penalty(&self) -> f64 {
        self.length_penalty
    }

    /// Serialized length (in characters) above which the length penalty applies.
    pub fn length_threshold(&self) -> usize {
        self.length_threshold
    }

    pub fn critical_bonus(&self) -> f64 {
        self.critical_bonus
    }

    /// Per-position age penalty applied by the priority scorer.
    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    pub fn temporal_floor(&self) -> usize {
        self.temporal_floor
    }

    pub fn fingerprint_len(&self) -> usize {
        self.fingerprint_len
    }

    /// Whether the adaptive chain may drop system messages as a last resort.
    pub fn allow_hard_cutoff(&self) -> bool {
        self.allow_hard_cutoff
    }

    pub fn critical_patterns(&self) -> &CriticalPatterns {
        &self.critical_patterns
    }

    /// `capacity * target_ratio`, rounded down.
    pub fn target_tokens(&self) -> usize {
        (self.capacity as f64 * self.target_ratio) as usize
    }

    /// Target for reducing a history currently at `current_tokens`.
    ///
    /// Never lower than what `max_compaction_ratio` allows a single
    /// reduction to remove.
    pub fn reduction_target(&self, current_tokens: usize) -> usize {
        let floor = (current_tokens as f64 * (1.0 - self.max_compaction_ratio)).ceil() as usize;
        self.target_tokens().max(floor)
    }
}

/// Builder for [`BudgetConfig`]. All values start at the crate defaults.
#[derive(Debug, Clone)]
pub struct BudgetConfigBuilder {
    capacity: usize,
    warning_threshold: f64,
    prune_threshold: f64,
    emergency_threshold: f64,
    target_ratio: f64,
    batch_size: usize,
    max_compaction_ratio: f64,
    per_message_overhead: usize,
    profile: BudgetProfile,
    role_weights: Option<RoleWeights>,
    recency_weight: f64,
    length_penalty: f64,
    length_threshold: usize,
    critical_bonus: f64,
    decay_rate: f64,
    temporal_floor: usize,
    fingerprint_len: usize,
    allow_hard_cutoff: bool,
    critical_patterns: Option<Vec<String>>,
}

impl BudgetConfigBuilder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            emergency_threshold: DEFAULT_EMERGENCY_THRESHOLD,
            target_ratio: DEFAULT_TARGET_RATIO,
            batch_size: 1,
            max_compaction_ratio: DEFAULT_MAX_COMPACTION_RATIO,
            per_message_overhead: DEFAULT_PER_MESSAGE_OVERHEAD,
            profile: BudgetProfile::default(),
            role_weights: None,
            recency_weight: DEFAULT_RECENCY_WEIGHT,
            length_penalty: DEFAULT_LENGTH_PENALTY,
            length_threshold: DEFAULT_LENGTH_THRESHOLD,
            critical_bonus: DEFAULT_CRITICAL_BONUS,
            decay_rate: 0.0,
            temporal_floor: DEFAULT_TEMPORAL_FLOOR,
            fingerprint_len: DEFAULT_FINGERPRINT_LEN,
            allow_hard_cutoff: false,
            critical_patterns: None,
        }
    }

    /// Set the warning, prune, and emergency ratios.
    pub fn with_thresholds(mut self, warning: f64, prune: f64, emergency: f64) -> Self {
        self.warning_threshold = warning;
        self.prune_threshold = prune;
        self.emergency_threshold = emergency;
        self
    }

    pub fn with_target_ratio(mut self, ratio: f64) -> Self {
        self.target_ratio = ratio;
        self
    }

    /// Messages the temporal strategy removes per step.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_compaction_ratio(mut self, ratio: f64) -> Self {
        self.max_compaction_ratio = ratio;
        self
    }

    pub fn with_per_message_overhead(mut self, tokens: usize) -> Self {
        self.per_message_overhead = tokens;
        self
    }

    /// Pick the default role weights for a budget kind. Ignored when
    /// explicit weights are set with [`with_role_weights`](Self::with_role_weights).
    pub fn with_profile(mut self, profile: BudgetProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_role_weights(mut self, weights: RoleWeights) -> Self {
        self.role_weights = Some(weights);
        self
    }

    pub fn with_recency_weight(mut self, weight: f64) -> Self {
        self.recency_weight = weight;
        self
    }

    /// Penalty applied to messages longer than `threshold_chars`.
    pub fn with_length_penalty(mut self, penalty: f64, threshold_chars: usize) -> Self {
        self.length_penalty = penalty;
        self.length_threshold = threshold_chars;
        self
    }

    pub fn with_critical_bonus(mut self, bonus: f64) -> Self {
        self.critical_bonus = bonus;
        self
    }

    pub fn with_decay_rate(mut self, rate: f64) -> Self {
        self.decay_rate = rate;
        self
    }

    pub fn with_temporal_floor(mut self, messages: usize) -> Self {
        self.temporal_floor = messages;
        self
    }

    pub fn with_fingerprint_len(mut self, chars: usize) -> Self {
        self.fingerprint_len = chars;
        self
    }

    /// Allow the adaptive chain to drop any message, system included, when
    /// every other stage leaves the history over target.
    pub fn with_hard_cutoff(mut self, enabled: bool) -> Self {
        self.allow_hard_cutoff = enabled;
        self
    }

    /// Replace the critical-pattern set. Patterns are compiled in
    /// [`build`](Self::build).
    pub fn with_critical_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<BudgetConfig, ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let (w, p, e) = (
            self.warning_threshold,
            self.prune_threshold,
            self.emergency_threshold,
        );
        if !(0.0 < w && w < p && p < e && e <= 1.0) {
            return Err(ConfigError::ThresholdOrder {
                warning: w,
                prune: p,
                emergency: e,
            });
        }
        check_ratio("target_ratio", self.target_ratio)?;
        check_ratio("max_compaction_ratio", self.max_compaction_ratio)?;
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroCount { name: "batch_size" });
        }
        if self.fingerprint_len == 0 {
            return Err(ConfigError::ZeroCount {
                name: "fingerprint_len",
            });
        }

        let role_weights = self
            .role_weights
            .unwrap_or_else(|| RoleWeights::for_profile(self.profile));
        role_weights.validate()?;
        check_weight("recency_weight", self.recency_weight)?;
        check_weight("length_penalty", self.length_penalty)?;
        check_weight("critical_bonus", self.critical_bonus)?;
        check_weight("decay_rate", self.decay_rate)?;

        let critical_patterns = match self.critical_patterns {
            Some(patterns) => CriticalPatterns::new(patterns)?,
            None => CriticalPatterns::default(),
        };

        Ok(BudgetConfig {
            capacity: self.capacity,
            warning_threshold: w,
            prune_threshold: p,
            emergency_threshold: e,
            target_ratio: self.target_ratio,
            batch_size: self.batch_size,
            max_compaction_ratio: self.max_compaction_ratio,
            per_message_overhead: self.per_message_overhead,
            role_weights,
            recency_weight: self.recency_weight,
            length_penalty: self.length_penalty,
            length_threshold: self.length_threshold,
            critical_bonus: self.critical_bonus,
            decay_rate: self.decay_rate,
            temporal_floor: self.temporal_floor,
            fingerprint_len: self.fingerprint_len,
            allow_hard_cutoff: self.allow_hard_cutoff,
            critical_patterns,
        })
    }
}

fn check_ratio(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::RatioOutOfRange { name, value })
    }
}

fn check_weight(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeight { name, value })
    }
}

// ── CompactionConfig ───────────────────────────────────────────────

/// Settings for summarization-based session handoff.
///
/// The compaction threshold itself belongs to the
/// [`SessionTracker`](crate::context::SessionTracker), which owns the
/// per-session token counts it is compared against.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Most recent messages copied verbatim into every handoff.
    pub recent_tail: usize,
    /// How many of the latest critical messages from the summarized span are
    /// kept verbatim beside the summary. `None` keeps all of them.
    pub critical_keep: Option<usize>,
    /// Upper bound on the summarizer call.
    pub summary_timeout: Duration,
    /// Instructions passed to the summarizer.
    pub instructions: String,
    /// Patterns that mark a message as critical.
    pub critical_patterns: CriticalPatterns,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            recent_tail: DEFAULT_RECENT_TAIL,
            critical_keep: Some(DEFAULT_CRITICAL_KEEP),
            summary_timeout: DEFAULT_SUMMARY_TIMEOUT,
            instructions: DEFAULT_SUMMARY_INSTRUCTIONS.to_string(),
            critical_patterns: CriticalPatterns::default(),
        }
    }
}

impl CompactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recent_tail(mut self, messages: usize) -> Self {
        self.recent_tail = messages;
        self
    }

    /// Keep at most `count` critical messages next to the summary.
    pub fn with_critical_keep(mut self, count: usize) -> Self {
        self.critical_keep = Some(count);
        self
    }

    /// Keep every critical message from the summarized span verbatim.
    pub fn keep_all_critical(mut self) -> Self {
        self.critical_keep = None;
        self
    }

    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout = timeout;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_critical_patterns(mut self, patterns: CriticalPatterns) -> Self {
        self.critical_patterns = patterns;
        self
    }

    /// Reject settings that would make a handoff unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recent_tail == 0 {
            return Err(ConfigError::ZeroCount {
                name: "recent_tail",
            });
        }
        Ok(())
    }
}
