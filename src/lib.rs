//! HASCONV is a library and application for decoding the Galileo High
//! Accuracy Service (HAS) correction stream out of receiver container
//! formats (SBF, BINEX, Novatel ASCII) and re-emitting it as IGS-SSR or
//! RTCM3-SSR messages.
pub mod bits;

pub mod convert;

pub mod crc;

pub mod deframe;

pub mod genmat;

pub mod gf256;

pub mod has;

pub mod sink;

pub mod source;

pub mod ssr;
