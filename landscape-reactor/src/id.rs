/// A handle returned by `call_on`, `call_later`, and `call_every`, usable
/// with `cancel_call` regardless of which kind of callback it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallId(u64);

#[derive(Debug, Default)]
pub struct CallIdSource(u64);

impl CallIdSource {
    pub fn next(&mut self) -> CallId {
        self.0 += 1;
        CallId(self.0)
    }
}
