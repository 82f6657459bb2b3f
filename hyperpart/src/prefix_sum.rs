use rayon::prelude::*;

/// Exclusive prefix sum over `values`, in place, returning the total.
///
/// One chunk is carved out per available thread; never fewer than one
/// element per chunk, never more chunks than elements.
pub fn parallel_prefix_sum(values: &mut [usize]) -> usize {
    let threads = rayon::current_num_threads().max(1);
    let chunk_len = values.len().div_ceil(threads).max(1);
    scan_in_chunks(values, chunk_len)
}

/// The two-pass scan behind [`parallel_prefix_sum`]: sum every chunk in
/// parallel, turn the chunk sums into chunk offsets sequentially (there
/// are at most as many as threads), then rewrite every chunk in parallel
/// starting from its offset. The result equals a sequential exclusive
/// scan for any chunk length.
fn scan_in_chunks(values: &mut [usize], chunk_len: usize) -> usize {
    if values.is_empty() {
        return 0;
    }

    let mut chunk_offsets: Vec<usize> = values
        .par_chunks(chunk_len)
        .map(|chunk| chunk.iter().sum())
        .collect();

    let mut total = 0;
    for offset in &mut chunk_offsets {
        let sum = *offset;
        *offset = total;
        total += sum;
    }

    values
        .par_chunks_mut(chunk_len)
        .zip(chunk_offsets)
        .for_each(|(chunk, mut running)| {
            for value in chunk {
                let v = *value;
                *value = running;
                running += v;
            }
        });

    total
}
