/// Register level access to one compare-match timer channel.
///
/// Implemented per peripheral by the firmware, and by a recording mock in
/// tests. `compare` values never exceed the channel's `counter_max`.
pub trait CompareTimer {
    /// Stop the clock, select `divider`, zero the counter and load the first compare value.
    fn configure(&mut self, divider: u16, compare: u32);
    /// Load the compare value for the next chunk.
    ///
    /// Called from the compare match, after the counter has already wrapped to
    /// zero and kept counting. The counter must not be cleared here or the
    /// ticks spent reaching the handler are lost from the period. Use
    /// [`compare_already_passed`] to catch a chunk shorter than that latency.
    fn arm_next_chunk(&mut self, compare: u32);
    fn enable_interrupt(&mut self);
    fn disable_interrupt(&mut self);
    fn clear_pending_flag(&mut self);
    /// Gate the clock off without touching counter or compare state.
    fn pause_clock(&mut self);
    /// Reconnect the clock with the divider from the last `configure`.
    fn resume_clock(&mut self);
}

/// True when the counter has run past a freshly loaded compare value, so it
/// would count all the way round before matching.
pub const fn compare_already_passed(compare: u32, counter: u32) -> bool {
    compare <= counter
}
