mod helping;
mod rwset;
