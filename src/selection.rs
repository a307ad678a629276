//! Channel selection from user-supplied index arguments

use crate::error::SelectionError;

/// Boolean inclusion mask, one entry per listed channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    included: Vec<bool>,
}

impl Selection {
    /// Build a selection over `count` channels from index arguments.
    ///
    /// No arguments selects every channel. Otherwise each argument must be an
    /// index in `0..count`; the first one that is not aborts the whole
    /// selection. Repeating an index is harmless.
    pub fn parse<S: AsRef<str>>(count: usize, args: &[S]) -> Result<Self, SelectionError> {
        if args.is_empty() {
            return Ok(Self::all(count));
        }

        let mut included = vec![false; count];
        for arg in args {
            let index = parse_index(count, arg.as_ref())?;
            included[index] = true;
        }
        Ok(Self { included })
    }

    /// Select all `count` channels
    pub fn all(count: usize) -> Self {
        Self {
            included: vec![true; count],
        }
    }

    /// Number of channels the mask covers
    pub fn len(&self) -> usize {
        self.included.len()
    }

    /// Whether the mask covers no channels at all
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    /// Whether channel `index` is included (out-of-range indices are not)
    pub fn is_selected(&self, index: usize) -> bool {
        self.included.get(index).copied().unwrap_or(false)
    }

    /// Number of included channels
    pub fn selected_count(&self) -> usize {
        self.included.iter().filter(|&&included| included).count()
    }

    /// Included indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.included
            .iter()
            .enumerate()
            .filter_map(|(index, &included)| included.then_some(index))
    }
}

/// Parse one index argument against a list of `count` items.
pub fn parse_index(count: usize, arg: &str) -> Result<usize, SelectionError> {
    let index: usize = arg
        .trim()
        .parse()
        .map_err(|_| SelectionError::NotANumber {
            arg: arg.to_string(),
        })?;

    if index >= count {
        return Err(SelectionError::OutOfRange {
            arg: arg.to_string(),
            count,
        });
    }
    Ok(index)
}
