mod linear;
mod metric;
