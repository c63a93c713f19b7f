use serde::{Deserialize, Serialize};

/// Padding entry of every index tensor.
///
/// Offset spaces are capped below this value, so a padded slot never aliases a real offset.
pub const PAD: u32 = u32::MAX;

/// Dense row-major matrix of offsets whose rows are right-padded with [`PAD`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexMatrix {
    rows: usize,
    cols: usize,
    data: Vec<u32>,
}

impl IndexMatrix {
    /// Builds a matrix with `cols` columns; shorter rows are padded.
    ///
    /// Panics if a row is longer than `cols` or contains [`PAD`]: both are compiler bugs.
    pub fn from_rows<R: AsRef<[u32]>>(rows: impl IntoIterator<Item = R>, cols: usize) -> Self {
        let mut data = Vec::new();
        let mut count = 0usize;
        for row in rows {
            let row = row.as_ref();
            assert!(
                row.len() <= cols,
                "index row of length {} exceeds width {cols}",
                row.len()
            );
            assert!(!row.contains(&PAD), "index row contains the padding sentinel");
            data.extend_from_slice(row);
            data.extend(std::iter::repeat(PAD).take(cols - row.len()));
            count += 1;
        }
        Self {
            rows: count,
            cols,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }

    /// Full row including padding.
    pub fn row(&self, index: usize) -> &[u32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    /// Non-padding prefix of a row.
    pub fn valid(&self, index: usize) -> &[u32] {
        let row = self.row(index);
        let len = row.iter().position(|&value| value == PAD).unwrap_or(row.len());
        &row[..len]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[u32]> {
        (0..self.rows).map(move |index| self.row(index))
    }

    pub fn num_padded(&self) -> usize {
        self.data.iter().filter(|&&value| value == PAD).count()
    }
}
