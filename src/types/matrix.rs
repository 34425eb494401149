// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Two-dimensional tables of districts (rows) by parties (columns).

use std::iter::Sum;

/// Dense row-major matrix.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Matrix<T> {
    num_rows: usize,
    num_cols: usize,
    cells: Vec<T>,
}

/// Votes of each party (column) in each district (row).
pub type VoteMatrix = Matrix<u64>;

/// Seats of each party (column) in each district (row).
pub type SeatMatrix = Matrix<usize>;

impl<T> Matrix<T>
where
    T: Copy + Default + Sum<T>,
{
    /// Creates a matrix filled with the default value (zero).
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Matrix {
            num_rows,
            num_cols,
            cells: vec![T::default(); num_rows * num_cols],
        }
    }

    /// Creates a matrix from its rows, which must all have the same length.
    pub fn from_rows<R: AsRef<[T]>>(num_cols: usize, rows: impl IntoIterator<Item = R>) -> Self {
        let mut cells = Vec::new();
        let mut num_rows = 0;
        for row in rows {
            let row = row.as_ref();
            assert_eq!(row.len(), num_cols, "All rows must have {num_cols} columns");
            cells.extend_from_slice(row);
            num_rows += 1;
        }
        Matrix {
            num_rows,
            num_cols,
            cells,
        }
    }

    /// Number of rows (districts).
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of columns (parties).
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Returns the cell at the given row and column.
    pub fn get(&self, row: usize, col: usize) -> T {
        self.cells[self.index(row, col)]
    }

    /// Sets the cell at the given row and column.
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        let index = self.index(row, col);
        self.cells[index] = value;
    }

    /// Returns the given row.
    pub fn row(&self, row: usize) -> &[T] {
        &self.cells[row * self.num_cols..(row + 1) * self.num_cols]
    }

    /// Returns an iterator over the given column.
    pub fn col(&self, col: usize) -> impl Iterator<Item = T> + '_ {
        assert!(col < self.num_cols);
        (0..self.num_rows).map(move |row| self.get(row, col))
    }

    /// Returns the sum of each row.
    pub fn row_sums(&self) -> Vec<T> {
        (0..self.num_rows)
            .map(|row| self.row(row).iter().copied().sum())
            .collect()
    }

    /// Returns the sum of each column.
    pub fn col_sums(&self) -> Vec<T> {
        (0..self.num_cols).map(|col| self.col(col).sum()).collect()
    }

    /// Returns the sum of all cells.
    pub fn total(&self) -> T {
        self.cells.iter().copied().sum()
    }

    /// Returns a new matrix made of the given columns, in the given order.
    pub fn select_cols(&self, cols: &[usize]) -> Self {
        let rows = (0..self.num_rows).map(|row| {
            cols.iter()
                .map(|&col| self.get(row, col))
                .collect::<Vec<_>>()
        });
        Matrix::from_rows(cols.len(), rows)
    }

    fn index(&self, row: usize, col: usize) -> usize {
        assert!(row < self.num_rows && col < self.num_cols);
        row * self.num_cols + col
    }
}
