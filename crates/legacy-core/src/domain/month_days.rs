//! Escalation sequence: the ordered day-of-month thresholds.

use serde::{Deserialize, Serialize};

use super::errors::NotificationError;

/// Validated, strictly increasing list of days of the month (at least two).
///
/// Deserialization goes through `try_from`, so a persisted record or a config
/// file can never produce an invalid sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct MonthDaySequence(Vec<u32>);

impl MonthDaySequence {
    pub fn new(days: Vec<u32>) -> Result<Self, NotificationError> {
        if days.len() < 2 {
            return Err(NotificationError::SequenceTooShort(days.len()));
        }
        for (index, pair) in days.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(NotificationError::SequenceNotIncreasing {
                    index: index + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }
        Ok(Self(days))
    }

    pub fn days(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: a valid sequence holds at least two days.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        self.0.get(index).copied()
    }

    pub fn last_index(&self) -> usize {
        self.0.len() - 1
    }

    pub fn last_day(&self) -> u32 {
        self.0[self.last_index()]
    }
}

impl TryFrom<Vec<u32>> for MonthDaySequence {
    type Error = NotificationError;

    fn try_from(days: Vec<u32>) -> Result<Self, Self::Error> {
        Self::new(days)
    }
}

impl From<MonthDaySequence> for Vec<u32> {
    fn from(sequence: MonthDaySequence) -> Self {
        sequence.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn accepts_increasing_days() {
        let seq = MonthDaySequence::new(vec![0, 10, 31]).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.last_index(), 2);
        assert_eq!(seq.last_day(), 31);
        assert_eq!(seq.get(1), Some(10));
        assert_eq!(seq.get(3), None);
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::single(vec![10])]
    fn rejects_short_sequences(#[case] days: Vec<u32>) {
        let len = days.len();
        assert_eq!(
            MonthDaySequence::new(days),
            Err(NotificationError::SequenceTooShort(len))
        );
    }

    #[rstest]
    #[case::duplicate(vec![10, 10])]
    #[case::decreasing(vec![10, 20, 15])]
    fn rejects_non_increasing_sequences(#[case] days: Vec<u32>) {
        assert!(matches!(
            MonthDaySequence::new(days),
            Err(NotificationError::SequenceNotIncreasing { .. })
        ));
    }

    #[test]
    fn deserialization_validates() {
        let ok: MonthDaySequence = serde_json::from_str("[1, 15, 28]").unwrap();
        assert_eq!(ok.days(), &[1, 15, 28]);

        let err = serde_json::from_str::<MonthDaySequence>("[15, 1]").unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));

        let err = serde_json::from_str::<MonthDaySequence>("[-1, 5]").unwrap_err();
        assert!(err.is_data());
    }
}
