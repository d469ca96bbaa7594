//! Sample producers drive what each sampling tick emits

use tracing::trace;

use crate::types::{FieldLayout, SampleRecord, SampleValues};
use crate::{CloudletError, Result};

/// Zip `values` with `layout`. Values beyond the layout's width are dropped.
pub(crate) fn build_record(
    layout: Option<&FieldLayout>,
    values: SampleValues,
) -> Result<SampleRecord> {
    let layout = layout.ok_or(CloudletError::FieldsNotConfigured)?;
    if values.supplied() > layout.len() {
        trace!("{} values for {} fields, extras dropped", values.supplied(), layout.len());
    }
    Ok(SampleRecord::build(layout, &values))
}

/// Per-tick view handed to a [`SampleProducer`].
///
/// A producer builds records against the configured field layout and queues them
/// with an index. The controller frames and transmits the queue once the producer
/// returns, in queue order.
pub struct SampleContext<'a> {
    tally: u64,
    layout: Option<&'a FieldLayout>,
    emitted: Vec<(u64, SampleRecord)>,
}

impl<'a> SampleContext<'a> {
    pub fn new(tally: u64, layout: Option<&'a FieldLayout>) -> Self {
        Self { tally, layout, emitted: Vec::new() }
    }

    /// 1-based count of ticks so far in this session
    pub fn tally(&self) -> u64 {
        self.tally
    }

    /// Build a record from positional values using the configured layout
    pub fn build_record(&self, values: impl Into<SampleValues>) -> Result<SampleRecord> {
        build_record(self.layout, values.into())
    }

    /// Queue a record for transmission under `index`
    pub fn emit(&mut self, index: u64, record: SampleRecord) {
        self.emitted.push((index, record));
    }

    /// Build a record and queue it under the current tally
    pub fn emit_values(&mut self, values: impl Into<SampleValues>) -> Result<()> {
        let record = self.build_record(values)?;
        self.emit(self.tally, record);
        Ok(())
    }

    pub fn into_emitted(self) -> Vec<(u64, SampleRecord)> {
        self.emitted
    }
}

/// Supplies the records for each sampling tick
pub trait SampleProducer: Send + Sync {
    fn produce(&mut self, ctx: &mut SampleContext<'_>) -> Result<()>;
}

impl<F> SampleProducer for F
where
    F: FnMut(&mut SampleContext<'_>) -> Result<()> + Send + Sync,
{
    fn produce(&mut self, ctx: &mut SampleContext<'_>) -> Result<()> {
        self(ctx)
    }
}

/// Producer that emits nothing; sessions still run and terminate
pub struct SilentProducer;

impl SampleProducer for SilentProducer {
    fn produce(&mut self, _ctx: &mut SampleContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Producer that reads up to four values per tick from a sampling function
pub struct ValueSource<F> {
    read: F,
}

impl<F, V> ValueSource<F>
where
    F: FnMut(u64) -> V + Send + Sync,
    V: Into<SampleValues>,
{
    pub fn new(read: F) -> Self {
        Self { read }
    }
}

impl<F, V> SampleProducer for ValueSource<F>
where
    F: FnMut(u64) -> V + Send + Sync,
    V: Into<SampleValues>,
{
    fn produce(&mut self, ctx: &mut SampleContext<'_>) -> Result<()> {
        let values = (self.read)(ctx.tally());
        ctx.emit_values(values)
    }
}
