use ndarray::{ArrayRef, CowArray, Ix1};

/// 1-D array reference, the argument type of [RvModel::evaluate](crate::RvModel::evaluate).
pub type ArrayRef1<T> = ArrayRef<T, Ix1>;

/// 1-D borrowed-or-owned array; observation storage of
/// [InstrumentData](crate::InstrumentData).
pub type CowArray1<'a, T> = CowArray<'a, T, Ix1>;
