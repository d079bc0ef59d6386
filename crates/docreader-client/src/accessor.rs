// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed access to scalar data items.
//
// Hides the engine's probe-then-fetch double call and decodes each payload
// into a `DataValue`. Plugin-range tags are refused here without reaching the
// engine; they belong to `PluginRegistry`.

use std::sync::Arc;

use tracing::{debug, instrument};

use docreader_core::{Codeline, DataType, DataValue, ErrorCode, ReaderError, Result, Tag};
use docreader_engine::ReaderEngine;

/// Scalar data item access over one engine.
#[derive(Clone)]
pub struct Accessor {
    engine: Arc<dyn ReaderEngine>,
}

impl Accessor {
    pub fn new(engine: Arc<dyn ReaderEngine>) -> Self {
        Self { engine }
    }

    fn scalar(tag: Tag) -> Result<DataType> {
        match tag {
            Tag::Data(data_type) => Ok(data_type),
            Tag::Plugin(_) => Err(ReaderError::PluginTagOnScalarAccessor(tag.vendor_name())),
        }
    }

    /// Bytes needed for instance `index` of `tag`; 0 when absent.
    pub fn probe_at(&self, tag: impl Into<Tag>, index: usize) -> Result<usize> {
        let tag = Tag::Data(Self::scalar(tag.into())?);
        let mut len = 0;
        self.engine
            .get_data(tag, &mut [], &mut len, index)
            .map_err(|code| ReaderError::engine(code, "GetData"))?;
        Ok(len)
    }

    pub fn probe(&self, tag: impl Into<Tag>) -> Result<usize> {
        self.probe_at(tag, 0)
    }

    /// Copy instance `index` into `buf`, returning the bytes written. An
    /// out-of-range index yields 0.
    pub fn fetch(&self, tag: impl Into<Tag>, buf: &mut [u8], index: usize) -> Result<usize> {
        let tag = Tag::Data(Self::scalar(tag.into())?);
        if buf.is_empty() {
            return Ok(0);
        }
        let mut len = buf.len();
        self.engine
            .get_data(tag, buf, &mut len, index)
            .map_err(|code| ReaderError::engine(code, "GetData"))?;
        Ok(len)
    }

    pub fn count(&self, tag: impl Into<Tag>) -> Result<usize> {
        let tag = Tag::Data(Self::scalar(tag.into())?);
        self.engine
            .get_data_count(tag)
            .map_err(|code| ReaderError::engine(code, "GetDataCount"))
    }

    /// Raw payload of instance `index`, or `None` when absent.
    ///
    /// An item that grows between probe and fetch is probed again once.
    pub fn get_raw(&self, tag: impl Into<Tag>, index: usize) -> Result<Option<Vec<u8>>> {
        let tag = tag.into();
        Self::scalar(tag)?;
        let mut regrown = false;
        loop {
            let needed = self.probe_at(tag, index)?;
            if needed == 0 {
                return Ok(None);
            }
            let mut buf = vec![0u8; needed];
            let mut len = needed;
            match self.engine.get_data(tag, &mut buf, &mut len, index) {
                Ok(()) => {
                    buf.truncate(len);
                    return Ok(Some(buf));
                }
                Err(ErrorCode::DataBufferTooSmall) if !regrown => {
                    debug!(tag = %tag, index, needed, now = len, "item grew between probe and fetch");
                    regrown = true;
                }
                Err(code) => return Err(ReaderError::engine(code, "GetData")),
            }
        }
    }

    /// Decoded instance `index` of `tag`, or `None` when absent.
    pub fn get(&self, tag: impl Into<Tag>, index: usize) -> Result<Option<DataValue>> {
        let tag = tag.into();
        let data_type = Self::scalar(tag)?;
        self.get_raw(tag, index)?
            .map(|bytes| DataValue::decode(data_type, &bytes))
            .transpose()
    }

    /// Every instance, using the engine's count.
    #[instrument(skip(self))]
    pub fn get_all(&self, tag: DataType) -> Result<Vec<DataValue>> {
        let count = self.count(tag)?;
        let mut values = Vec::with_capacity(count);
        for index in 0..count {
            if let Some(value) = self.get(tag, index)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Instances in index order until the first absent one.
    pub fn iter(&self, tag: DataType) -> ValueIter<'_> {
        ValueIter {
            accessor: self,
            tag,
            index: 0,
            done: false,
        }
    }

    /// The OCR codeline, parsed.
    pub fn codeline(&self) -> Result<Option<Codeline>> {
        match self.get(DataType::Codeline, 0)? {
            Some(DataValue::Codeline(codeline)) => Ok(Some(codeline)),
            Some(_) | None => Ok(None),
        }
    }
}

pub struct ValueIter<'a> {
    accessor: &'a Accessor,
    tag: DataType,
    index: usize,
    done: bool,
}

impl Iterator for ValueIter<'_> {
    type Item = Result<DataValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.accessor.get(self.tag, self.index);
        self.index += 1;
        match item {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
