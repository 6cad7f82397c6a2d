// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry policies for install steps.

use serde::Deserialize;
use std::{cmp::Ordering, fmt, time::Duration};

/// Type for the `install-retries` key.
#[derive(Debug, Copy, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "backoff", rename_all = "kebab-case", deny_unknown_fields)]
pub enum RetryPolicy {
    /// Fixed backoff.
    #[serde(rename_all = "kebab-case")]
    Fixed {
        /// Maximum retry count.
        count: u32,

        /// Delay between retries.
        #[serde(default, with = "humantime_serde")]
        delay: Duration,
    },

    /// Exponential backoff.
    #[serde(rename_all = "kebab-case")]
    Exponential {
        /// Maximum retry count.
        count: u32,

        /// Delay before the first retry. Doubled for each subsequent retry.
        #[serde(with = "humantime_serde")]
        delay: Duration,

        /// If set, limits the delay between retries.
        #[serde(default, with = "humantime_serde")]
        max_delay: Option<Duration>,
    },
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self::new_without_delay(0)
    }
}

impl RetryPolicy {
    /// Create new policy with no delay between retries.
    pub fn new_without_delay(count: u32) -> Self {
        Self::Fixed {
            count,
            delay: Duration::ZERO,
        }
    }

    /// Returns the number of retries.
    pub fn count(&self) -> u32 {
        match self {
            Self::Fixed { count, .. } | Self::Exponential { count, .. } => *count,
        }
    }

    /// Returns the total number of attempts: the first try plus retries.
    pub fn total_attempts(&self) -> u32 {
        self.count().saturating_add(1)
    }

    /// Returns the delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match *self {
            Self::Fixed { delay, .. } => delay,
            Self::Exponential {
                delay, max_delay, ..
            } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                let delay = delay.saturating_mul(factor);
                match max_delay {
                    Some(max_delay) => delay.min(max_delay),
                    None => delay,
                }
            }
        }
    }
}

pub(crate) fn deserialize_retry_policy<'de, D>(deserializer: D) -> Result<RetryPolicy, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct V;

    impl<'de2> serde::de::Visitor<'de2> for V {
        type Value = RetryPolicy;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(
                formatter,
                "a table ({{ count = 5, backoff = \"exponential\", delay = \"1s\", max-delay = \"10s\" }}) or a number (5)"
            )
        }

        // Note that TOML uses i64, not u64.
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            match v.cmp(&0) {
                Ordering::Greater | Ordering::Equal => {
                    let v = u32::try_from(v).map_err(|_| {
                        serde::de::Error::invalid_value(
                            serde::de::Unexpected::Signed(v),
                            &"a positive u32",
                        )
                    })?;
                    Ok(RetryPolicy::new_without_delay(v))
                }
                Ordering::Less => Err(serde::de::Error::invalid_value(
                    serde::de::Unexpected::Signed(v),
                    &self,
                )),
            }
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let v = u32::try_from(v).map_err(|_| {
                serde::de::Error::invalid_value(serde::de::Unexpected::Unsigned(v), &"a positive u32")
            })?;
            Ok(RetryPolicy::new_without_delay(v))
        }

        fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::MapAccess<'de2>,
        {
            RetryPolicy::deserialize(serde::de::value::MapAccessDeserializer::new(map))
        }
    }

    let retry_policy = deserializer.deserialize_any(V)?;
    if let RetryPolicy::Exponential {
        count,
        delay,
        max_delay,
    } = &retry_policy
    {
        if *count == 0 {
            return Err(serde::de::Error::custom(
                "`count` cannot be zero with exponential backoff",
            ));
        }
        if delay.is_zero() {
            return Err(serde::de::Error::custom(
                "`delay` cannot be zero with exponential backoff",
            ));
        }
        if max_delay.is_some_and(|max_delay| max_delay < *delay) {
            return Err(serde::de::Error::custom(
                "`max-delay` cannot be less than delay with exponential backoff",
            ));
        }
    }

    Ok(retry_policy)
}
