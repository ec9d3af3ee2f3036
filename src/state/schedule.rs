use thiserror::Error;

use crate::defs::TimeOfDay;

/// Fixed-capacity, insertion-ordered table of daily triggers.
///
/// Entries are addressed by position. Removing an entry shifts every later
/// entry down by one, changing their indices; peers addressing the table over
/// the wire must account for this.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleTable {
    entries: Vec<TimeOfDay>,
    capacity: usize,
}

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("schedule is full ({capacity} entries)")]
    CapacityExceeded { capacity: usize },

    #[error("no schedule entry at index {index} (count is {count})")]
    IndexOutOfRange { index: usize, count: usize },
}

impl ScheduleTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn with_entries(capacity: usize, seed: &[TimeOfDay]) -> Self {
        let mut table = Self::new(capacity);

        for &entry in seed.iter().take(capacity) {
            let _ = table.add(entry);
        }

        table
    }

    pub fn entries(&self) -> &[TimeOfDay] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add(&mut self, entry: TimeOfDay) -> Result<(), ScheduleError> {
        if self.entries.len() == self.capacity {
            return Err(ScheduleError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        self.entries.push(entry);
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> Result<TimeOfDay, ScheduleError> {
        self.check_index(index)?;
        Ok(self.entries.remove(index))
    }

    pub fn update_at(&mut self, index: usize, entry: TimeOfDay) -> Result<(), ScheduleError> {
        self.check_index(index)?;
        self.entries[index] = entry;
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), ScheduleError> {
        match index < self.entries.len() {
            true => Ok(()),
            false => Err(ScheduleError::IndexOutOfRange {
                index,
                count: self.entries.len(),
            }),
        }
    }
}
