use itertools::Itertools;
use nalgebra::DMatrix;
use std::mem;
use std::ops::{Add, Mul, Neg};
use std::sync::atomic::{AtomicUsize, Ordering};

#[allow(non_camel_case_types)]
type float = f64;

/// Handle to a set of entries whose values can be rewritten after the matrix has been built.
#[derive(Clone, Debug)]
pub struct BlockRef {
    id: usize,
    nrows: usize,
    ncols: usize,
}

impl BlockRef {
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }
}

// Row `r` and column `c` of a tracked block live at `(rows[r], cols[c])` in the parent matrix.
#[derive(Clone, Debug)]
struct TrackedBlock {
    id: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    sparsity: DMatrix<bool>,
}

#[derive(Clone, Debug)]
pub struct Builder {
    tracked_blocks: Vec<TrackedBlock>,
    coords: Vec<(usize, usize, float)>,
    nrows: usize,
    ncols: usize,
}

impl Builder {
    pub fn with_capacity(nrows: usize, ncols: usize, nnz: usize) -> Builder {
        Builder {
            tracked_blocks: Vec::new(),
            coords: Vec::with_capacity(nnz),
            nrows,
            ncols,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Adds `val` to the entry at `(r, c)`. Duplicates are summed when the matrix is built.
    pub fn push(&mut self, r: usize, c: usize, val: float) {
        assert!(
            r < self.nrows && c < self.ncols,
            "entry ({}, {}) outside {}x{} matrix",
            r,
            c,
            self.nrows,
            self.ncols
        );
        self.coords.push((r, c, val));
    }

    /// Drops every entry below the diagonal, as required for OSQP's `P` matrix.
    pub fn upper_triangular(mut self) -> Builder {
        assert!(
            self.tracked_blocks.is_empty(),
            "tracked blocks cannot be restricted to the upper triangle"
        );
        self.coords.retain(|&(r, c, _)| r <= c);
        self
    }

    pub fn build_csc(&mut self) -> CscMatrix {
        // Sort and sum any duplicates in the same cell
        let mut coords = mem::take(&mut self.coords);
        coords.sort_unstable_by_key(|&(r, c, _)| (c, r));
        self.coords = coords
            .into_iter()
            .coalesce(|l, r| {
                if l.0 == r.0 && l.1 == r.1 {
                    Ok((l.0, l.1, l.2 + r.2))
                } else {
                    Err((l, r))
                }
            })
            .collect();

        let mut indptr = vec![0; self.ncols + 1];
        let mut indices = vec![0; self.coords.len()];
        let mut data = vec![0.0; self.coords.len()];

        // Fill in CSC column start and end pointer and row index
        let mut last_c = 0;
        for (i, &(r, c, val)) in self.coords.iter().enumerate() {
            while last_c < c {
                last_c += 1;
                indptr[last_c] = i;
            }
            indices[i] = r;
            data[i] = val;
        }
        // Set the remaining column index pointers to one past the end of the data array
        while last_c < self.ncols {
            last_c += 1;
            indptr[last_c] = self.coords.len();
        }

        // Calculate the tracked block indices
        let mut tracked_blocks = self
            .tracked_blocks
            .iter()
            .map(|block| {
                let (nrows, ncols) = block.sparsity.shape();
                let mut block_indices = DMatrix::from_element(nrows, ncols, None);

                for c in 0..ncols {
                    let col = block.cols[c];
                    let rows_start = indptr[col];
                    let row_indices = &indices[rows_start..indptr[col + 1]];

                    // Ignore entries that are always empty
                    for r in (0..nrows).filter(|&r| block.sparsity[(r, c)]) {
                        // row_indices are guaranteed to be in ascending order
                        let offset = row_indices
                            .binary_search(&block.rows[r])
                            .expect("tracked entry missing from built matrix");
                        block_indices[(r, c)] = Some(rows_start + offset);
                    }
                }

                (block.id, block_indices)
            })
            .collect::<Vec<_>>();

        tracked_blocks.sort_unstable_by_key(|b| b.0);

        CscMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            indptr,
            indices,
            data,
            tracked_blocks,
        }
    }
}

impl AsRef<Builder> for Builder {
    fn as_ref(&self) -> &Builder {
        self
    }
}

impl Add for Builder {
    type Output = Builder;

    fn add(self, other: Builder) -> Builder {
        add(&[self, other])
    }
}

impl<'a> Add<&'a Builder> for Builder {
    type Output = Builder;

    fn add(self, other: &'a Builder) -> Builder {
        add(&[&self, other])
    }
}

impl<'a, 'b> Add<&'b Builder> for &'a Builder {
    type Output = Builder;

    fn add(self, other: &'b Builder) -> Builder {
        add(&[self, other])
    }
}

impl Mul<float> for Builder {
    type Output = Builder;

    fn mul(mut self, other: float) -> Builder {
        for (_, _, val) in &mut self.coords {
            *val *= other;
        }
        self
    }
}

impl Neg for Builder {
    type Output = Builder;

    fn neg(mut self) -> Builder {
        for (_, _, val) in &mut self.coords {
            *val = -*val;
        }
        self
    }
}

impl<'a> Neg for &'a Builder {
    type Output = Builder;

    fn neg(self) -> Builder {
        -self.clone()
    }
}

pub fn zeros(nrows: usize, ncols: usize) -> Builder {
    Builder::with_capacity(nrows, ncols, 0)
}

pub fn eye(n: usize) -> Builder {
    let mut builder = Builder::with_capacity(n, n, n);
    for i in 0..n {
        builder.coords.push((i, i, 1.0));
    }
    builder
}

pub fn block(block: &DMatrix<float>) -> Builder {
    let (nrows, ncols) = block.shape();

    let coords = (0..nrows)
        .flat_map(move |r| (0..ncols).map(move |c| (r, c, block[(r, c)])))
        .filter(|&(_, _, val)| val != 0.0)
        .collect();

    Builder {
        tracked_blocks: Vec::new(),
        coords,
        nrows,
        ncols,
    }
}

/// A dense block with a fixed sparsity pattern whose values are set after building.
pub fn block_mut(sparsity: &DMatrix<bool>) -> (Builder, BlockRef) {
    let (nrows, ncols) = sparsity.shape();
    let rows: Vec<usize> = (0..nrows).collect();
    let cols: Vec<usize> = (0..ncols).collect();
    scatter_mut(nrows, ncols, &rows, &cols, sparsity)
}

/// Like `block_mut` but row `r` of the block is placed at `rows[r]` and column `c` at `cols[c]`
/// of an `nrows` x `ncols` matrix.
pub fn scatter_mut(
    nrows: usize,
    ncols: usize,
    rows: &[usize],
    cols: &[usize],
    sparsity: &DMatrix<bool>,
) -> (Builder, BlockRef) {
    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

    let (block_nrows, block_ncols) = sparsity.shape();
    assert_eq!(rows.len(), block_nrows);
    assert_eq!(cols.len(), block_ncols);
    assert!(rows.iter().all(|&r| r < nrows), "scattered row out of range");
    assert!(cols.iter().all(|&c| c < ncols), "scattered column out of range");

    let coords = (0..block_nrows)
        .flat_map(move |r| {
            (0..block_ncols)
                .filter(move |&c| sparsity[(r, c)])
                .map(move |c| (rows[r], cols[c], 0.0))
        })
        .collect();

    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);

    (
        Builder {
            tracked_blocks: vec![TrackedBlock {
                id,
                rows: rows.to_vec(),
                cols: cols.to_vec(),
                sparsity: sparsity.clone(),
            }],
            coords,
            nrows,
            ncols,
        },
        BlockRef {
            id,
            nrows: block_nrows,
            ncols: block_ncols,
        },
    )
}

pub fn add<B: AsRef<Builder>>(blocks: &[B]) -> Builder {
    fn op(acc: &mut Builder, nrows: &mut usize, ncols: &mut usize, block: &Builder) {
        assert_eq!(
            *nrows, block.nrows,
            "matrices being added must have the same number of rows"
        );
        assert_eq!(
            *ncols, block.ncols,
            "matrices being added must have the same number of columns"
        );
        block_merge(acc, block, 0, 0);
    }

    let (nrows, ncols) = blocks
        .first()
        .map(AsRef::as_ref)
        .map(|b| (b.nrows, b.ncols))
        .unwrap_or((0, 0));
    merge_op(blocks, nrows, ncols, op)
}

pub fn hstack<B: AsRef<Builder>>(blocks: &[B]) -> Builder {
    fn op(acc: &mut Builder, nrows: &mut usize, ncols: &mut usize, block: &Builder) {
        assert_eq!(
            *nrows, block.nrows,
            "hstack requires matrices to have the same number of rows"
        );
        block_merge(acc, block, 0, *ncols);
        *ncols += block.ncols;
    }

    let nrows = blocks.first().map(|b| b.as_ref().nrows).unwrap_or(0);
    merge_op(blocks, nrows, 0, op)
}

pub fn vstack<B: AsRef<Builder>>(blocks: &[B]) -> Builder {
    fn op(acc: &mut Builder, nrows: &mut usize, ncols: &mut usize, block: &Builder) {
        assert_eq!(
            *ncols, block.ncols,
            "vstack requires matrices to have the same number of columns"
        );
        block_merge(acc, block, *nrows, 0);
        *nrows += block.nrows;
    }

    let ncols = blocks.first().map(|b| b.as_ref().ncols).unwrap_or(0);
    merge_op(blocks, 0, ncols, op)
}

fn merge_op<B: AsRef<Builder>>(
    blocks: &[B],
    nrows: usize,
    ncols: usize,
    op: fn(&mut Builder, &mut usize, &mut usize, &Builder),
) -> Builder {
    let (nnz, nt) = blocks.iter().map(AsRef::as_ref).fold((0, 0), |(nnz, nt), b| {
        (nnz + b.coords.len(), nt + b.tracked_blocks.len())
    });
    let mut acc = Builder::with_capacity(0, 0, nnz);
    acc.tracked_blocks = Vec::with_capacity(nt);

    let (mut acc, final_nrows, final_ncols) = blocks.iter().map(AsRef::as_ref).fold(
        (acc, nrows, ncols),
        |(mut acc, mut nrows, mut ncols), block| {
            op(&mut acc, &mut nrows, &mut ncols, block);
            (acc, nrows, ncols)
        },
    );

    acc.nrows = final_nrows;
    acc.ncols = final_ncols;
    acc
}

fn block_merge(left: &mut Builder, right: &Builder, row_shift: usize, col_shift: usize) {
    let left_coords_len = left.coords.len();
    let left_tracked_blocks_len = left.tracked_blocks.len();

    left.coords.extend_from_slice(&right.coords);
    left.tracked_blocks.extend_from_slice(&right.tracked_blocks);

    // Update right coordinates
    for (r, c, _) in &mut left.coords[left_coords_len..] {
        *r += row_shift;
        *c += col_shift;
    }

    // Update tracked block positions
    for block in &mut left.tracked_blocks[left_tracked_blocks_len..] {
        block.rows.iter_mut().for_each(|r| *r += row_shift);
        block.cols.iter_mut().for_each(|c| *c += col_shift);
    }
}

#[derive(Clone, Debug)]
pub struct CscMatrix {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<float>,
    tracked_blocks: Vec<(usize, DMatrix<Option<usize>>)>,
}

impl CscMatrix {
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn data(&self) -> &[float] {
        &self.data
    }

    pub fn set_block(&mut self, block: &BlockRef, value: &DMatrix<float>) {
        assert_eq!((block.nrows, block.ncols), value.shape());

        let start_idx = self
            .tracked_blocks
            .binary_search_by(|&(id, _)| id.cmp(&block.id));
        let mut start_idx = start_idx.expect("Block not in this matrix");

        for i in (0..start_idx).rev() {
            if self.tracked_blocks[i].0 != block.id {
                break;
            }
            start_idx = i;
        }

        for i in start_idx..self.tracked_blocks.len() {
            let (id, indices) = &self.tracked_blocks[i];
            if *id != block.id {
                break;
            }
            for (index, &val) in indices.iter().zip(value.iter()) {
                if let Some(index) = *index {
                    self.data[index] = val;
                } else {
                    assert_eq!(
                        0.0, val,
                        "unexpected non-zero element in sparse tracked block"
                    );
                }
            }
        }
    }

    pub fn to_dense(&self) -> DMatrix<float> {
        let mut mat = DMatrix::zeros(self.nrows, self.ncols);

        for c in 0..self.ncols {
            for i in self.indptr[c]..self.indptr[c + 1] {
                let r = self.indices[i];
                mat[(r, c)] = self.data[i];
            }
        }

        mat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ops_should_not_panic() {
        add::<Builder>(&[]);
        hstack::<Builder>(&[]);
        vstack::<Builder>(&[]);
    }

    #[test]
    fn add_simple() {
        #[rustfmt::skip]
        let a = DMatrix::from_row_slice(3, 3, &[
            14.0, 0.0, 9.0,
            0.0, 0.0, 0.0,
            1.0, 0.0, 7.0,
        ]);
        #[rustfmt::skip]
        let b = DMatrix::from_row_slice(3, 3, &[
            2.0, 0.0, 5.0,
            0.0, 4.0, 6.0,
            0.0, 0.0, 3.0,
        ]);

        #[rustfmt::skip]
        let expected = DMatrix::from_row_slice(3, 3, &[
            16.0, 0.0, 14.0,
            0.0, 4.0, 6.0,
            1.0, 0.0, 10.0,
        ]);

        let comparison = (block(&a) + block(&b)).build_csc().to_dense();

        assert_eq!(expected, comparison);
    }

    #[test]
    #[should_panic]
    fn add_panic() {
        let a = DMatrix::from_element(3, 3, 1.0);
        let b = DMatrix::from_element(2, 3, 1.0);

        let _ = block(&a) + block(&b);
    }

    #[test]
    fn mul_and_neg() {
        #[rustfmt::skip]
        let a = DMatrix::from_row_slice(2, 2, &[
            14.0, 0.0,
            1.0, 7.0,
        ]);

        let tripled = (block(&a) * 3.0).build_csc().to_dense();
        assert_eq!(a.clone() * 3.0, tripled);

        let negated = (-block(&a)).build_csc().to_dense();
        assert_eq!(-a, negated);
    }

    #[test]
    fn stacking() {
        let a = DMatrix::from_element(1, 2, 1.0);
        let b = DMatrix::from_element(1, 1, 2.0);

        #[rustfmt::skip]
        let expected = DMatrix::from_row_slice(2, 3, &[
            1.0, 1.0, 2.0,
            0.0, 0.0, 1.0,
        ]);

        let top = hstack(&[block(&a), block(&b)]);
        let bottom = hstack(&[zeros(1, 2), eye(1)]);
        let comparison = vstack(&[top, bottom]).build_csc().to_dense();

        assert_eq!(expected, comparison);
    }

    #[test]
    fn csc_layout_is_column_major() {
        #[rustfmt::skip]
        let a = DMatrix::from_row_slice(2, 3, &[
            1.0, 0.0, 3.0,
            2.0, 0.0, 4.0,
        ]);
        let csc = block(&a).build_csc();

        assert_eq!(csc.indptr(), &[0, 2, 2, 4]);
        assert_eq!(csc.indices(), &[0, 1, 0, 1]);
        assert_eq!(csc.data(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(csc.nnz(), 4);
    }

    #[test]
    fn duplicates_are_summed() {
        let mut builder = zeros(2, 2);
        builder.push(1, 0, 1.5);
        builder.push(1, 0, 2.5);
        let dense = builder.build_csc().to_dense();
        assert_eq!(dense[(1, 0)], 4.0);
    }

    #[test]
    fn upper_triangular_drops_lower_entries() {
        #[rustfmt::skip]
        let a = DMatrix::from_row_slice(2, 2, &[
            2.0, -1.0,
            -1.0, 2.0,
        ]);
        #[rustfmt::skip]
        let expected = DMatrix::from_row_slice(2, 2, &[
            2.0, -1.0,
            0.0, 2.0,
        ]);

        let comparison = block(&a).upper_triangular().build_csc().to_dense();
        assert_eq!(expected, comparison);
    }

    #[test]
    fn mut_blocks_survive_stacking() {
        #[rustfmt::skip]
        let b = DMatrix::from_row_slice(2, 2, &[
            2.0, 3.0,
            5.0, 0.0,
        ]);

        let c_sp = DMatrix::from_element(2, 2, true);
        #[rustfmt::skip]
        let c_val = DMatrix::from_row_slice(2, 2, &[
            14.0, 0.0,
            16.0, 17.0,
        ]);
        let (c, c_block) = block_mut(&c_sp);

        #[rustfmt::skip]
        let d_sp = DMatrix::from_row_slice(3, 2, &[
            false, false,
            true, false,
            true, false,
        ]);
        #[rustfmt::skip]
        let d_val_1 = DMatrix::from_row_slice(3, 2, &[
            0.0, 0.0,
            0.0, 0.0,
            1.0, 0.0,
        ]);
        #[rustfmt::skip]
        let d_val_2 = DMatrix::from_row_slice(3, 2, &[
            0.0, 0.0,
            99.0, 0.0,
            18.0, 0.0,
        ]);
        let (d, d_block) = block_mut(&d_sp);

        #[rustfmt::skip]
        let expected_1 = DMatrix::from_row_slice(5, 4, &[
            2.0, 3.0, 14.0, 0.0,
            5.0, 0.0, 16.0, 17.0,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
        ]);

        #[rustfmt::skip]
        let expected_2 = DMatrix::from_row_slice(5, 4, &[
            2.0, 3.0, 14.0, 0.0,
            5.0, 0.0, 16.0, 17.0,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 99.0, 0.0,
            0.0, 0.0, 18.0, 0.0,
        ]);

        let mut comparison = vstack(&[
            hstack(&[block(&b), c]),
            hstack(&[zeros(3, 2), d]),
        ])
        .build_csc();

        comparison.set_block(&c_block, &c_val);
        comparison.set_block(&d_block, &d_val_1);

        assert_eq!(expected_1, comparison.to_dense());

        comparison.set_block(&d_block, &d_val_2);

        assert_eq!(expected_2, comparison.to_dense());
    }

    #[test]
    fn scattered_block_writes_to_mapped_positions() {
        let sp = DMatrix::from_element(2, 2, true);
        let (scattered, handle) = scatter_mut(4, 4, &[3, 0], &[1, 2], &sp);
        let mut csc = (eye(4) + scattered).build_csc();

        #[rustfmt::skip]
        let values = DMatrix::from_row_slice(2, 2, &[
            5.0, 6.0,
            7.0, 8.0,
        ]);
        csc.set_block(&handle, &values);

        #[rustfmt::skip]
        let expected = DMatrix::from_row_slice(4, 4, &[
            1.0, 7.0, 8.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 5.0, 6.0, 1.0,
        ]);
        assert_eq!(expected, csc.to_dense());
        assert_eq!(handle.shape(), (2, 2));
    }

    #[test]
    #[should_panic(expected = "unexpected non-zero element")]
    fn writing_outside_sparsity_panics() {
        #[rustfmt::skip]
        let sp = DMatrix::from_row_slice(1, 2, &[
            true, false,
        ]);
        let (b, handle) = block_mut(&sp);
        let mut csc = hstack(&[b]).build_csc();
        csc.set_block(&handle, &DMatrix::from_element(1, 2, 1.0));
    }
}
