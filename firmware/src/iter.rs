/// One block of the firmware payload
#[derive(Debug, PartialEq, Eq)]
pub struct PayloadBlock<'a> {
    /// Zero-based block number
    pub index: usize,
    /// Offset into the payload (not the image)
    pub offset: usize,
    pub data: &'a [u8],
}

pub struct PayloadBlocks<'a> {
    inner: std::slice::Chunks<'a, u8>,
    index: usize,
    offset: usize,
}

impl<'a> PayloadBlocks<'a> {
    pub(crate) fn new(payload: &'a [u8], block_size: usize) -> Self {
        PayloadBlocks {
            inner: payload.chunks(block_size),
            index: 0,
            offset: 0,
        }
    }
}

impl<'a> Iterator for PayloadBlocks<'a> {
    type Item = PayloadBlock<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.inner.next()?;
        let block = PayloadBlock {
            index: self.index,
            offset: self.offset,
            data,
        };
        self.index += 1;
        self.offset += data.len();
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for PayloadBlocks<'_> {}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn test_short_last_block() {
        let fw = FirmwareImage::from_vec(vec![0xAA; HEADER_LEN + 2500]).unwrap();
        let blocks: Vec<_> = fw.blocks(1024).collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].index, 2);
        assert_eq!(blocks[2].offset, 2048);
        assert_eq!(blocks[2].data.len(), 2500 - 2048);
        assert_eq!(fw.blocks(1024).len(), fw.block_count(1024));
    }
}
