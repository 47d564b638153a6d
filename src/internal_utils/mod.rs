// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod io;
pub mod stream;

use crate::*;

macro_rules! conversion_function {
    ($func:ident, $to: ident, $from:ty) => {
        pub(crate) fn $func(value: $from) -> HeifResult<$to> {
            $to::try_from(value).or(Err(HeifError::BmffParseFailed(
                "integer conversion overflow".into(),
            )))
        }
    };
}

conversion_function!(usize_from_u64, usize, u64);

// Checked arithmetic over offsets and lengths. Every sum of wire-supplied
// values must go through one of these.
macro_rules! checked_add {
    ($a:expr, $b:expr) => {
        $a.checked_add($b).ok_or($crate::HeifError::BmffParseFailed(
            "arithmetic overflow".into(),
        ))
    };
}

macro_rules! checked_sub {
    ($a:expr, $b:expr) => {
        $a.checked_sub($b).ok_or($crate::HeifError::BmffParseFailed(
            "arithmetic underflow".into(),
        ))
    };
}

macro_rules! checked_mul {
    ($a:expr, $b:expr) => {
        $a.checked_mul($b).ok_or($crate::HeifError::BmffParseFailed(
            "arithmetic overflow".into(),
        ))
    };
}

macro_rules! checked_incr {
    ($a:expr, $b:expr) => {
        $a = checked_add!($a, $b)?
    };
}

pub(crate) use checked_add;
pub(crate) use checked_incr;
pub(crate) use checked_mul;
pub(crate) use checked_sub;
