mod common;

mod commands;
mod contexts;
mod lifecycle;
mod negotiation;
