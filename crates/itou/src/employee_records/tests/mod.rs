mod common;
mod preparation;
mod transfer;
