// Image header sniffing: format and pixel size without decoding.

pub mod image;
