//! HAS page assembly and erasure decoding
//!
//! Each Galileo C/NAV page carries one 53-byte coded chunk ("page") of a
//! HAS message, tagged with a rolling message ID (0..31), a page ID
//! (1..255) and the message size in pages (1..32). Any mS distinct pages
//! of a message reconstruct it by inverting the matching submatrix of
//! the public generator matrix over GF(256).
//!
//! `HasAssembler` keeps one accumulation bucket per message ID, applies
//! the duplicate/timeout discipline and hands out decoded messages as
//! byte buffers (mS·53 bytes, i.e. mS·424 bits).

use log::{debug, trace, warn};

use crate::bits::BitReader;
use crate::genmat::GenMatrix;
use crate::gf256;

/// Bits in one C/NAV page after the receiver framing is removed
pub const CNAV_BITS: usize = 462;

/// Bytes needed to hold a packed C/NAV page (462 bits + 2 pad bits)
pub const CNAV_BYTES: usize = 58;

const SYNC_BITS: usize = 14;
const PAGE_BYTES: usize = 53;
const NUM_MIDS: usize = 32;

/// The 24 bits following the sync pattern on a dummy page
const DUMMY_PATTERN: u32 = 0xAF3BC3;

/// Window of time (seconds of ToW) a bucket may keep collecting pages
const TIME_LIMIT: f64 = 20.0;

/// One C/NAV page as located by a container deframer
///
/// `bits` holds the 462 C/NAV bits packed big-endian; the final two bits
/// of the buffer are padding. `tow` is the receiver time of week in
/// seconds, `week` the GNSS week number where the container carries one.
pub struct CnavPage {
    pub bits: [u8; CNAV_BYTES],
    pub tow: f64,
    pub week: Option<u16>,
}

/// A fully decoded HAS message
pub struct HasMessage {
    /// mS·53 bytes of message content
    pub bytes: Vec<u8>,
    /// ToW of the first page that opened the bucket
    pub tow: f64,
}

/// HAS page header, the 24 bits after the C/NAV sync pattern
struct PageHeader {
    status: u8,
    mtype: u8,
    mid: u8,
    msize: u8,
    pid: u8,
}

impl PageHeader {
    fn from_word(w: u32) -> PageHeader {
        PageHeader {
            status: (w >> 22) as u8,
            // 2 reserved bits at 20..22
            mtype: (w >> 18 & 0x3) as u8,
            mid: (w >> 13 & 0x1f) as u8,
            msize: (w >> 8 & 0x1f) as u8 + 1,
            pid: (w & 0xff) as u8,
        }
    }
}

/// Accumulation state for one message ID
struct Bucket {
    mtype: u8,
    msize: u8,
    t0: f64,
    /// Arena for all 255 possible pages of this message
    pages: Box<[u8]>,
    present: [bool; 255],
    /// Accepted page indices (pageID − 1) in arrival order
    rec: Vec<usize>,
}

impl Bucket {
    fn new() -> Bucket {
        Bucket {
            mtype: 0,
            msize: 0,
            t0: 0.0,
            pages: vec![0u8; 255 * PAGE_BYTES].into_boxed_slice(),
            present: [false; 255],
            rec: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.rec.is_empty()
    }

    fn clear(&mut self) {
        self.present = [false; 255];
        self.rec.clear();
    }

    fn page(&self, idx: usize) -> &[u8] {
        &self.pages[idx * PAGE_BYTES..(idx + 1) * PAGE_BYTES]
    }

    fn store(&mut self, idx: usize, payload: &[u8]) {
        self.pages[idx * PAGE_BYTES..(idx + 1) * PAGE_BYTES].copy_from_slice(payload);
        self.present[idx] = true;
        self.rec.push(idx);
    }
}

/// Collects C/NAV pages into per-mID buckets and decodes completed
/// messages
pub struct HasAssembler {
    genmat: GenMatrix,
    buckets: Vec<Bucket>,
    /// Suppresses re-buffering pages of the message just decoded, which
    /// keep arriving for the rest of the transmission burst
    last_decoded_mid: Option<u8>,
}

impl HasAssembler {
    pub fn new(genmat: GenMatrix) -> HasAssembler {
        HasAssembler {
            genmat,
            buckets: (0..NUM_MIDS).map(|_| Bucket::new()).collect(),
            last_decoded_mid: None,
        }
    }

    /// Feed one C/NAV page. Returns a decoded message when this page
    /// completes one.
    ///
    /// All data defects (dummy pages, bad status, inconsistent
    /// duplicates, timeouts, singular submatrices) are handled here:
    /// the affected bucket is reinitialized and `None` returned.
    pub fn feed(&mut self, page: &CnavPage) -> Option<HasMessage> {
        let mut rd = BitReader::new(&page.bits);
        if rd.read(SYNC_BITS)? != 0x3fff {
            trace!("page without C/NAV sync pattern");
            return None;
        }
        let word = rd.read(24)?;
        if word == DUMMY_PATTERN {
            trace!("dummy HAS page");
            return None;
        }
        let hdr = PageHeader::from_word(word);
        // status 00 = test, 01 = operational; both are accepted
        if hdr.status > 1 || hdr.mtype != 1 {
            trace!("page with status {} mtype {} ignored", hdr.status, hdr.mtype);
            return None;
        }
        if self.last_decoded_mid == Some(hdr.mid) {
            return None;
        }

        let mut payload = [0u8; PAGE_BYTES];
        for b in payload.iter_mut() {
            *b = rd.read(8)? as u8;
        }

        let bucket = &mut self.buckets[hdr.mid as usize];
        if !bucket.is_empty() {
            if page.tow - bucket.t0 > TIME_LIMIT {
                warn!(
                    "mID {}: page timeout after {:.1}s, reinitializing",
                    hdr.mid,
                    page.tow - bucket.t0
                );
                bucket.clear();
            } else if bucket.mtype != hdr.mtype || bucket.msize != hdr.msize {
                warn!(
                    "mID {}: message collision (size {} -> {}), reinitializing",
                    hdr.mid, bucket.msize, hdr.msize
                );
                bucket.clear();
            }
        }
        if bucket.is_empty() {
            bucket.mtype = hdr.mtype;
            bucket.msize = hdr.msize;
            bucket.t0 = page.tow;
        }

        if hdr.pid == 0 {
            // page ID 0 is reserved
            return None;
        }
        let idx = hdr.pid as usize - 1;
        if bucket.present[idx] {
            if bucket.page(idx) != &payload[..] {
                warn!(
                    "mID {}: page {} received again with different content, reinitializing",
                    hdr.mid, hdr.pid
                );
                bucket.clear();
            }
            // identical duplicate: idempotent
            return None;
        }

        bucket.store(idx, &payload);
        trace!(
            "mID {}: page {} accepted ({}/{})",
            hdr.mid,
            hdr.pid,
            bucket.rec.len(),
            bucket.msize
        );
        if bucket.rec.len() < bucket.msize as usize {
            return None;
        }

        let result = Self::decode(&self.genmat, bucket);
        let t0 = bucket.t0;
        bucket.clear();
        match result {
            Ok(bytes) => {
                debug!("mID {}: message decoded, {} pages", hdr.mid, hdr.msize);
                self.last_decoded_mid = Some(hdr.mid);
                Some(HasMessage { bytes, tow: t0 })
            }
            Err(gf256::SingularMatrix) => {
                warn!(
                    "mID {}: generator submatrix is singular, discarding message",
                    hdr.mid
                );
                None
            }
        }
    }

    /// Erasure-decode a complete bucket: invert the generator submatrix
    /// selected by the last mS accepted pages and multiply it onto them.
    fn decode(genmat: &GenMatrix, bucket: &Bucket) -> Result<Vec<u8>, gf256::SingularMatrix> {
        let ms = bucket.msize as usize;
        let idxs = &bucket.rec[bucket.rec.len() - ms..];
        let gsub = genmat.submatrix(idxs, ms);
        let ginv = gf256::invert(&gsub, ms)?;
        let mut coded = Vec::with_capacity(ms * PAGE_BYTES);
        for &i in idxs {
            coded.extend_from_slice(bucket.page(i));
        }
        Ok(gf256::mat_mul(&ginv, &coded, ms, PAGE_BYTES))
    }
}
