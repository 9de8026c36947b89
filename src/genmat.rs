//! The HAS Reed-Solomon generator matrix
//!
//! A fixed, public 255×32 matrix over GF(256). Page with page ID p is the
//! codeword row p−1: for a message of mS pages, the transmitted page is
//! `genMat[p−1, 0..mS] · M` where M is the mS×53 message. Any mS distinct
//! rows restricted to the first mS columns are invertible, which is what
//! makes 1..255 page subsets decodable.
//!
//! The matrix ships as a CSV resource and is parsed once at startup.

pub const PAGES: usize = 255;
pub const MAX_MSIZE: usize = 32;

pub struct GenMatrix {
    rows: Vec<[u8; MAX_MSIZE]>,
}

impl GenMatrix {
    /// Parse the bundled `resources/gen_matrix.csv`.
    ///
    /// The resource is shipped with the binary; a malformed matrix is a
    /// packaging defect and fails startup.
    pub fn load() -> GenMatrix {
        Self::parse(include_str!("../resources/gen_matrix.csv"))
            .expect("bundled gen_matrix.csv is malformed")
    }

    fn parse(text: &str) -> Result<GenMatrix, String> {
        let mut rows = Vec::with_capacity(PAGES);
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut row = [0u8; MAX_MSIZE];
            let mut n = 0;
            for field in line.split(',') {
                if n >= MAX_MSIZE {
                    return Err(format!("line {}: more than {} columns", lineno + 1, MAX_MSIZE));
                }
                row[n] = field
                    .trim()
                    .parse::<u8>()
                    .map_err(|e| format!("line {}: {}", lineno + 1, e))?;
                n += 1;
            }
            if n != MAX_MSIZE {
                return Err(format!("line {}: expected {} columns, got {}", lineno + 1, MAX_MSIZE, n));
            }
            rows.push(row);
        }
        if rows.len() != PAGES {
            return Err(format!("expected {} rows, got {}", PAGES, rows.len()));
        }
        Ok(GenMatrix { rows })
    }

    /// One full 32-column row; `idx` is pageID − 1
    pub fn row(&self, idx: usize) -> &[u8; MAX_MSIZE] {
        &self.rows[idx]
    }

    /// Row-major k×k submatrix: the given rows, restricted to the first
    /// k columns. `idxs` are pageID − 1 values.
    pub fn submatrix(&self, idxs: &[usize], k: usize) -> Vec<u8> {
        assert!(k <= MAX_MSIZE && idxs.len() == k);
        let mut out = Vec::with_capacity(k * k);
        for &i in idxs {
            out.extend_from_slice(&self.rows[i][..k]);
        }
        out
    }
}
